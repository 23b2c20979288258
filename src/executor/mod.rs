//! Statement executor subsystem
//!
//! Applies one statement to the backend that owns it:
//!
//! 1. `CREATE DATABASE` / `DROP DATABASE` run on the base backend with no
//!    database selected (and are mirrored to the shards)
//! 2. SELECT/INSERT/UPDATE/DELETE naming a table ask the shard router; the
//!    chosen shard selects the database and runs the statement
//! 3. Everything else selects the database on the base backend and runs there
//!
//! Backend errors are returned verbatim and never retried.

mod errors;
mod executor;
mod result;

pub use errors::{ExecutorError, ExecutorResult};
pub use executor::{run_blocking, StatementExecutor};
pub use result::{Execution, Placement};
