//! Observability events for shardrelay
//!
//! Every lifecycle transition worth grepping for in the logs has a name here.
//! Events are attached to log lines as the `event` field.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Node startup begins
    BootStart,
    /// Node is ready to serve
    Serving,
    /// Shutdown initiated
    ShutdownStart,

    // Configuration
    /// Configuration loaded and validated
    ConfigLoaded,

    // Sessions (primary)
    /// Secondary connection accepted
    SessionOpened,
    /// Setup handshake finished
    HandshakeComplete,
    /// Setup handshake failed, session torn down
    HandshakeFailed,
    /// Session removed from the registry
    SessionClosed,
    /// Session evicted because its outbound queue overflowed
    SessionEvicted,

    // Link (secondary)
    /// Connected to the primary
    LinkEstablished,
    /// Connection to the primary lost
    LinkLost,

    // Statements
    /// Statement executed locally
    StatementExecuted,
    /// Statement rejected by policy or protocol
    StatementRejected,
    /// Statement failed in the backend
    StatementFailed,

    // Replication
    /// Statement fanned out to peers
    Broadcast,
    /// Statement forwarded to the primary
    Forwarded,
    /// New table-to-shard assignment
    ShardAssigned,
    /// Assignment received from the primary disagrees with the local one
    ShardDivergence,

    // Full sync
    /// Full sync requested or started
    FullSyncStart,
    /// Full sync finished
    FullSyncComplete,
    /// Full sync failed
    FullSyncFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "NODE_STARTUP_BEGIN",
            Event::Serving => "NODE_SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",

            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::SessionOpened => "SESSION_OPENED",
            Event::HandshakeComplete => "HANDSHAKE_COMPLETE",
            Event::HandshakeFailed => "HANDSHAKE_FAILED",
            Event::SessionClosed => "SESSION_CLOSED",
            Event::SessionEvicted => "SESSION_EVICTED",

            Event::LinkEstablished => "LINK_ESTABLISHED",
            Event::LinkLost => "LINK_LOST",

            Event::StatementExecuted => "STATEMENT_EXECUTED",
            Event::StatementRejected => "STATEMENT_REJECTED",
            Event::StatementFailed => "STATEMENT_FAILED",

            Event::Broadcast => "BROADCAST",
            Event::Forwarded => "FORWARDED",
            Event::ShardAssigned => "SHARD_ASSIGNED",
            Event::ShardDivergence => "SHARD_DIVERGENCE",

            Event::FullSyncStart => "FULL_SYNC_BEGIN",
            Event::FullSyncComplete => "FULL_SYNC_COMPLETE",
            Event::FullSyncFailed => "FULL_SYNC_FAILED",
        }
    }

    /// Returns true if the node cannot continue after this event
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::FullSyncFailed | Event::LinkLost)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
