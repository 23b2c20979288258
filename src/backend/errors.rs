//! # Backend Errors
//!
//! Errors raised by a storage backend. Messages are surfaced to the statement's
//! submitter verbatim, so they read like engine messages.

use thiserror::Error;

use crate::errors::ErrorKind;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Selected database does not exist
    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),

    /// CREATE DATABASE without IF NOT EXISTS on an existing database
    #[error("Can't create database '{0}'; database exists")]
    DatabaseExists(String),

    /// Statement needs a database and none was selected
    #[error("No database selected")]
    NoDatabaseSelected,

    /// Database name is not a plain identifier
    #[error("Incorrect database name '{0}'")]
    InvalidName(String),

    /// Table does not exist in the selected database
    #[error("Table '{database}.{table}' doesn't exist")]
    UnknownTable { database: String, table: String },

    /// The engine rejected the statement
    #[error("{0}")]
    Statement(String),

    /// Filesystem failure under the data directory
    #[error("I/O error: {0}")]
    Io(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Backend
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        BackendError::Statement(e.to_string())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}
