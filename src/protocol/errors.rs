//! # Protocol Errors
//!
//! Errors raised while framing or parsing coordination-channel messages.

use std::io;

use thiserror::Error;

use crate::errors::ErrorKind;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Protocol errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    // ==================
    // Transport Errors
    // ==================
    /// Socket read or write failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Peer closed the connection in the middle of a frame
    #[error("Connection closed mid-frame")]
    Truncated,

    /// Length prefix above the configured bound; the stream cannot be resynchronized
    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    // ==================
    // Message Errors
    // ==================
    /// Frame body is not UTF-8
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    /// Message without a `|` delimiter where a request was expected
    #[error("Invalid request")]
    InvalidRequest,

    /// Known verb with a payload it cannot carry
    #[error("Invalid {verb} payload: {payload}")]
    InvalidPayload { verb: String, payload: String },
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Io(_) | ProtocolError::Truncated | ProtocolError::FrameTooLarge { .. } => {
                ErrorKind::Transport
            }
            ProtocolError::InvalidUtf8
            | ProtocolError::InvalidRequest
            | ProtocolError::InvalidPayload { .. } => ErrorKind::Protocol,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::Truncated
        } else {
            ProtocolError::Io(e.to_string())
        }
    }
}
