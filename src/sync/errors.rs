//! # Full-Sync Errors

use thiserror::Error;

use crate::backend::BackendError;
use crate::errors::ErrorKind;
use crate::executor::ExecutorError;
use crate::protocol::ProtocolError;

/// Result type for full-sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Full-sync errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Reading the snapshot from a backend failed
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// The consumer of the snapshot went away
    #[error("Snapshot stream aborted")]
    Aborted,

    /// Snapshot worker panicked or was cancelled
    #[error("Snapshot worker failed: {0}")]
    Worker(String),

    /// The primary answered the request with an error
    #[error("Primary rejected full sync: {0}")]
    Rejected(String),

    /// Framing failure on the link
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Link closed before `FULL_SYNC_END`
    #[error("Connection closed during full sync")]
    ConnectionClosed,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Backend(_) | SyncError::Worker(_) => ErrorKind::Backend,
            SyncError::Aborted | SyncError::ConnectionClosed => ErrorKind::Transport,
            SyncError::Rejected(_) => ErrorKind::Protocol,
            SyncError::Protocol(e) => e.kind(),
        }
    }
}

impl From<ExecutorError> for SyncError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Backend(source) | ExecutorError::SelectDatabase { source, .. } => {
                SyncError::Backend(source)
            }
            ExecutorError::Worker(message) => SyncError::Worker(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(SyncError::ConnectionClosed.kind(), ErrorKind::Transport);
        assert_eq!(
            SyncError::Rejected("disk full".to_string()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            SyncError::from(ProtocolError::Truncated).kind(),
            ErrorKind::Transport
        );
    }
}
