//! Replication Subsystem
//!
//! One primary, any number of secondaries, one TCP connection per secondary.
//!
//! - The primary applies a write locally first and only then forwards the
//!   same `database|statement` frame to every other active session
//! - A secondary applies its own writes locally and forwards them to the
//!   primary, which applies and fans them out in turn
//! - CREATE/DROP originate only at the primary; the channel rejects them
//! - Per-peer failures never roll back a local write
//!
//! There is no consensus, no exactly-once delivery and no conflict resolution
//! between concurrent writers. Propagation is best-effort and ordered per
//! connection only.
//!
//! # Sessions
//!
//! Each connection on the primary is a session moving through
//! `Connecting -> Handshaking -> Active -> Closed`. During the handshake the
//! primary sends its setup commands as `master|..` frames and waits for one
//! reply per command. A session leaves the registry on its first read or
//! write failure, or when its outbound queue overflows.

mod broadcast;
mod config;
mod errors;
mod primary;
mod role;
mod secondary;
mod session;

pub use broadcast::{fan_out, AckPolicy, BroadcastReport};
pub use config::{with_default_port, CoordinationConfig, DEFAULT_COORDINATION_PORT};
pub use errors::{ReplicationError, ReplicationResult};
pub use primary::{PrimaryCoordinator, PrimaryServer};
pub use role::NodeRole;
pub use secondary::{PrimaryLink, SecondaryNode};
pub use session::{
    spawn_writer, AckSender, CloseReason, Outbound, SessionHandle, SessionId, SessionInfo,
    SessionRegistry, SessionState,
};
