//! Crate-wide error classification
//!
//! Every subsystem error maps onto one of these kinds. The kind decides what
//! happens to the connection that carried the failing request.

use std::fmt;

/// How a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection refused/reset, read or write failure. The session is torn
    /// down and is not retried.
    Transport,

    /// Malformed frame or unexpected verb. Answered with an explicit error
    /// reply; the connection stays open.
    Protocol,

    /// Operation not allowed from this origin (CREATE/DROP from a
    /// secondary). Rejected explicitly; the connection stays open.
    Policy,

    /// The storage engine rejected a statement. The text is surfaced to the
    /// submitter verbatim.
    Backend,

    /// Invalid configuration. Fatal at startup.
    Config,
}

impl ErrorKind {
    /// Whether the connection that produced the error must be closed.
    pub fn closes_connection(&self) -> bool {
        matches!(self, ErrorKind::Transport)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Policy => "policy",
            ErrorKind::Backend => "backend",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_closes_connection() {
        assert!(ErrorKind::Transport.closes_connection());
        assert!(!ErrorKind::Protocol.closes_connection());
        assert!(!ErrorKind::Policy.closes_connection());
        assert!(!ErrorKind::Backend.closes_connection());
    }
}
