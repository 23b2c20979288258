//! # Control Surface
//!
//! The call interface an operator (or the HTTP API) uses to talk to a node:
//! submit a statement, browse databases, tables, columns and rows, and read
//! the node's status.
//!
//! Policy:
//! - CREATE/DROP are accepted only on the primary and only from the
//!   `master` user role
//! - SELECT runs locally and is never replicated
//! - Every other statement is applied locally first, then replicated

mod errors;
mod surface;

pub use errors::{ControlError, ControlResult};
pub use surface::{
    ControlSurface, NodeStatus, Replicator, RowField, StatementOutcome, MASTER_ROLE,
};
