//! # Node Errors
//!
//! Startup and runtime failures of a whole node. All of them stop the
//! process.

use thiserror::Error;

use crate::backend::BackendError;
use crate::errors::ErrorKind;
use crate::replication::ReplicationError;

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Node errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// Config file missing, malformed or inconsistent
    #[error("Invalid config: {0}")]
    Config(String),

    /// A storage backend could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] BackendError),

    /// Coordination channel failure
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// The control API could not be served
    #[error("Control API error: {0}")]
    Control(String),
}

impl NodeError {
    pub fn config(message: impl Into<String>) -> Self {
        NodeError::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Config(_) => ErrorKind::Config,
            NodeError::Storage(e) => e.kind(),
            NodeError::Replication(e) => e.kind(),
            NodeError::Control(_) => ErrorKind::Transport,
        }
    }
}
