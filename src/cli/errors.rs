//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero status.

use std::fmt;
use std::io;

use crate::errors::ErrorKind;
use crate::node::NodeError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, runtime)
    IoError,
    /// Role in the config does not match the command
    RoleMismatch,
    /// Node could not start
    BootFailed,
    /// Node stopped with an error after starting
    NodeFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SHARDRELAY_CLI_CONFIG_ERROR",
            Self::IoError => "SHARDRELAY_CLI_IO_ERROR",
            Self::RoleMismatch => "SHARDRELAY_CLI_ROLE_MISMATCH",
            Self::BootFailed => "SHARDRELAY_CLI_BOOT_FAILED",
            Self::NodeFailed => "SHARDRELAY_CLI_NODE_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Config role differs from the subcommand
    pub fn role_mismatch(expected: &str, found: &str) -> Self {
        Self::new(
            CliErrorCode::RoleMismatch,
            format!("config role is '{}', command expects '{}'", found, expected),
        )
    }

    /// Boot failed
    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<NodeError> for CliError {
    fn from(e: NodeError) -> Self {
        let code = match e.kind() {
            ErrorKind::Config => CliErrorCode::ConfigError,
            ErrorKind::Transport => CliErrorCode::NodeFailed,
            ErrorKind::Protocol | ErrorKind::Policy | ErrorKind::Backend => {
                CliErrorCode::BootFailed
            }
        };
        Self::new(code, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
