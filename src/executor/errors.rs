//! # Executor Errors
//!
//! Failures while applying one statement. Backend text is carried verbatim.

use thiserror::Error;

use crate::backend::BackendError;
use crate::errors::ErrorKind;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Executor errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The backend rejected the statement
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// `USE <database>` failed on the backend that would run the statement
    #[error("{source}")]
    SelectDatabase {
        database: String,
        backend: String,
        source: BackendError,
    },

    /// Blocking worker panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Backend
    }

    /// Whether the failure happened while selecting the database.
    pub fn is_selection(&self) -> bool {
        matches!(self, ExecutorError::SelectDatabase { .. })
    }
}
