//! # Control Errors
//!
//! Errors returned to a control-surface caller. Messages are shown to the
//! operator as-is.

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::executor::ExecutorError;

/// Result type for control-surface operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Control-surface errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    // ==================
    // Request Errors
    // ==================
    /// A required parameter was empty or absent
    #[error("{0} is required")]
    MissingParameter(&'static str),

    /// The database could not be selected
    #[error("Error selecting database: {0}")]
    SelectDatabase(String),

    /// Table name is not a plain identifier
    #[error("Invalid table name '{0}'")]
    InvalidTable(String),

    /// The table has nothing to show besides its `id`
    #[error("No columns found in table (excluding id)")]
    NoColumns,

    /// No row with the requested id
    #[error("No row found with id: {0}")]
    RowNotFound(String),

    // ==================
    // Policy Errors
    // ==================
    /// CREATE/DROP from a non-master caller, or on a secondary
    #[error("CREATE and DROP are Master-only operations")]
    MasterOnly,

    // ==================
    // Backend Errors
    // ==================
    /// The backend rejected the statement
    #[error("Error executing query: {0}")]
    Statement(String),

    // ==================
    // Transport Errors
    // ==================
    /// The local write succeeded but the primary link is gone
    #[error("Write applied locally but could not be forwarded to the primary: {0}")]
    ForwardFailed(String),

    /// A blocking worker failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::MissingParameter(_)
            | ControlError::SelectDatabase(_)
            | ControlError::InvalidTable(_)
            | ControlError::NoColumns
            | ControlError::RowNotFound(_) => ErrorKind::Protocol,
            ControlError::MasterOnly => ErrorKind::Policy,
            ControlError::Statement(_) => ErrorKind::Backend,
            ControlError::ForwardFailed(_) | ControlError::Internal(_) => ErrorKind::Transport,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlError::RowNotFound(_))
    }
}

impl From<ExecutorError> for ControlError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::SelectDatabase { source, .. } => {
                ControlError::SelectDatabase(source.to_string())
            }
            ExecutorError::Worker(reason) => ControlError::Internal(reason),
            ExecutorError::Backend(source) => ControlError::Statement(source.to_string()),
        }
    }
}
