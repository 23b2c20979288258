//! Replication Error Types
//!
//! Nothing here is retried. Transport failures end the session or link that
//! produced them; policy and protocol failures are answered on the wire and
//! leave the connection open.

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::executor::ExecutorError;
use crate::protocol::ProtocolError;
use crate::sync::SyncError;

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Replication errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplicationError {
    // ==================
    // Transport Errors
    // ==================
    /// Binding the coordination listener failed
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// Dialing the primary failed
    #[error("Failed to connect to primary at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// The connection to the peer is gone
    #[error("Connection to {0} closed")]
    ConnectionClosed(String),

    /// Framing failure on the connection
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    // ==================
    // Policy Errors
    // ==================
    /// CREATE/DROP submitted through the replication channel
    #[error("CREATE and DROP are master-only operations")]
    MasterOnly,

    /// Session state machine misuse
    #[error("Illegal session transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    // ==================
    // Wrapped Errors
    // ==================
    /// Local execution failed
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Bootstrap failed
    #[error("Full sync failed: {0}")]
    Sync(#[from] SyncError),

    /// Invalid coordination settings
    #[error("Invalid coordination config: {0}")]
    Config(String),
}

impl ReplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplicationError::Bind { .. }
            | ReplicationError::Connect { .. }
            | ReplicationError::ConnectionClosed(_) => ErrorKind::Transport,
            ReplicationError::Protocol(e) => e.kind(),
            ReplicationError::MasterOnly | ReplicationError::IllegalTransition { .. } => {
                ErrorKind::Policy
            }
            ReplicationError::Executor(e) => e.kind(),
            ReplicationError::Sync(e) => e.kind(),
            ReplicationError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ReplicationError::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ReplicationError::MasterOnly.kind(), ErrorKind::Policy);
        assert_eq!(
            ReplicationError::ConnectionClosed("primary".to_string()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            ReplicationError::from(ProtocolError::InvalidRequest).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(ReplicationError::config("x").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_master_only_message() {
        assert_eq!(
            ReplicationError::MasterOnly.to_string(),
            "CREATE and DROP are master-only operations"
        );
    }
}
