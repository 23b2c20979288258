//! Storage backend boundary
//!
//! The relational engine is an external collaborator: its dialect, transaction
//! engine and on-disk format are invoked, not reimplemented. This module fixes
//! the interface the coordination layer calls and ships one adapter, backed by
//! SQLite through `rusqlite`, where every database is one file under a data
//! directory (or one in-memory connection).
//!
//! Database selection is part of every call instead of connection state, so a
//! backend can be shared between tasks without one task's `USE` leaking into
//! another's statement.

mod errors;
mod sqlite;
mod types;

pub use errors::{BackendError, BackendResult};
pub use sqlite::SqliteBackend;
pub use types::{ColumnInfo, QueryRows, Value};

use std::fmt;

/// Databases that belong to the engine itself; never dumped or listed.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

/// Whether `name` is one of [`SYSTEM_DATABASES`].
pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES.contains(&name)
}

/// A relational storage instance.
///
/// Implementations must be safe to call from several threads at once; callers
/// do not add any locking of their own.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Name used in logs (`base`, `shard1`, ...).
    fn name(&self) -> &str;

    /// Check that `database` exists (the `USE database` step).
    fn select_database(&self, database: &str) -> BackendResult<()>;

    /// Execute one statement and return the affected-row count.
    ///
    /// `CREATE DATABASE`, `DROP DATABASE` and `USE` are accepted with no
    /// database selected; everything else requires one.
    fn execute(&self, database: Option<&str>, statement: &str) -> BackendResult<u64>;

    /// Run a statement that returns rows, binding `params` positionally.
    fn query(&self, database: &str, statement: &str, params: &[Value])
        -> BackendResult<QueryRows>;

    /// SHOW DATABASES, system databases included.
    fn list_databases(&self) -> BackendResult<Vec<String>>;

    /// SHOW TABLES in `database`.
    fn list_tables(&self, database: &str) -> BackendResult<Vec<String>>;

    /// DESCRIBE `table`.
    fn describe_columns(&self, database: &str, table: &str) -> BackendResult<Vec<ColumnInfo>>;

    /// SHOW CREATE TABLE `table`: the statement that recreates it.
    fn show_create_table(&self, database: &str, table: &str) -> BackendResult<String>;
}
