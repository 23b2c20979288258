//! Snapshot replay
//!
//! Applies a snapshot chunk by chunk. A statement that fails is logged and
//! counted; replay always carries on with the next one.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::executor::StatementExecutor;
use crate::sql::{database_command, split_statements, DatabaseCommand};

/// Outcome of one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub applied: u64,
    pub failed: u64,
}

impl ReplayReport {
    pub fn total(&self) -> u64 {
        self.applied + self.failed
    }
}

/// Replays snapshot statements into the local backends.
///
/// `USE` statements set the database for the statements that follow. Rows go
/// through the executor's routing, so they land on the shard the local router
/// picks for their table.
#[derive(Debug)]
pub struct SnapshotReplayer {
    executor: Arc<StatementExecutor>,
    current_database: Option<String>,
    report: ReplayReport,
}

impl SnapshotReplayer {
    pub fn new(executor: Arc<StatementExecutor>) -> Self {
        Self {
            executor,
            current_database: None,
            report: ReplayReport::default(),
        }
    }

    /// Split a chunk on `;` (outside quotes) and apply every statement.
    pub fn apply_chunk(&mut self, chunk: &str) {
        for statement in split_statements(chunk) {
            self.apply_statement(&statement);
        }
    }

    /// Apply one statement.
    pub fn apply_statement(&mut self, statement: &str) {
        let result = match database_command(statement) {
            Some(DatabaseCommand::Use(name)) => {
                let selected = self.executor.execute(statement, &name).map(|_| ());
                if selected.is_ok() {
                    self.current_database = Some(name);
                }
                selected
            }
            Some(_) => self.executor.execute(statement, "").map(|_| ()),
            None => match self.current_database.as_deref() {
                Some(database) => self.executor.execute(statement, database).map(|_| ()),
                None => self.executor.execute_direct(statement, None).map(|_| ()),
            },
        };

        match result {
            Ok(()) => {
                self.report.applied += 1;
                debug!(statement, "synced statement");
            }
            Err(e) => {
                self.report.failed += 1;
                warn!(statement, error = %e, "failed to apply synced statement");
            }
        }
    }

    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    pub fn report(&self) -> ReplayReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SqliteBackend, StorageBackend};
    use crate::observability::MetricsRegistry;
    use crate::sharding::{AllocationPolicy, ShardRouter};

    fn replayer(shards: usize) -> SnapshotReplayer {
        let base: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::in_memory("base"));
        let shards: Vec<Arc<dyn StorageBackend>> = (0..shards)
            .map(|i| {
                Arc::new(SqliteBackend::in_memory(format!("shard{}", i + 1)))
                    as Arc<dyn StorageBackend>
            })
            .collect();
        let router = Arc::new(ShardRouter::new(shards.len(), AllocationPolicy::FirstShard));
        let executor = StatementExecutor::new(base, shards, router, Arc::new(MetricsRegistry::new()));
        SnapshotReplayer::new(Arc::new(executor))
    }

    const DUMP: &str = "CREATE DATABASE IF NOT EXISTS shop;\nUSE shop;\n\
        CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT);\n\
        INSERT INTO orders (id, item) VALUES (1, 'a;b');\n";

    #[test]
    fn test_replay_applies_dump() {
        let mut replayer = replayer(0);
        replayer.apply_chunk(DUMP);

        assert_eq!(replayer.report(), ReplayReport { applied: 4, failed: 0 });
        assert_eq!(replayer.current_database(), Some("shop"));

        let rows = replayer
            .executor
            .base()
            .query("shop", "SELECT item FROM orders", &[])
            .unwrap();
        assert_eq!(rows.rows[0][0].to_display_string(), "a;b");
    }

    #[test]
    fn test_replaying_twice_keeps_create_database_idempotent() {
        let mut replayer = replayer(0);
        replayer.apply_chunk(DUMP);
        replayer.apply_chunk(DUMP);

        // the table and the row already exist; the database statements do not fail
        assert_eq!(replayer.report(), ReplayReport { applied: 6, failed: 2 });
    }

    #[test]
    fn test_malformed_statement_does_not_abort_replay() {
        let mut replayer = replayer(0);
        replayer.apply_chunk(
            "CREATE DATABASE IF NOT EXISTS shop;USE shop;CREATE TABLE t (a INTEGER);\
             INSERT INTO nowhere VALUES (;INSERT INTO t (a) VALUES (7)",
        );

        assert_eq!(replayer.report().failed, 1);
        assert_eq!(replayer.report().applied, 4);
        let rows = replayer
            .executor
            .base()
            .query("shop", "SELECT a FROM t", &[])
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
    }

    #[test]
    fn test_rows_follow_local_routing() {
        let mut replayer = replayer(1);
        replayer.apply_chunk(DUMP);

        let shard_rows = replayer.executor.shards()[0]
            .query("shop", "SELECT item FROM orders", &[])
            .unwrap();
        assert_eq!(shard_rows.rows.len(), 1);
    }

    #[test]
    fn test_reserved_word_columns_survive_round_trip() {
        let source = SqliteBackend::in_memory("source");
        source.execute(None, "CREATE DATABASE shop").unwrap();
        source
            .execute(
                Some("shop"),
                r#"CREATE TABLE orders (id INTEGER PRIMARY KEY, "order" TEXT, "select" INTEGER)"#,
            )
            .unwrap();
        source
            .execute(
                Some("shop"),
                r#"INSERT INTO orders (id, "order", "select") VALUES (1, 'lamp', 3)"#,
            )
            .unwrap();

        let mut replayer = replayer(0);
        crate::sync::produce_snapshot(&source, &[], |statement| {
            replayer.apply_statement(&statement);
            Ok(())
        })
        .unwrap();

        assert_eq!(replayer.report(), ReplayReport { applied: 4, failed: 0 });
        let rows = replayer
            .executor
            .base()
            .query("shop", r#"SELECT "order", "select" FROM orders"#, &[])
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0][0].to_display_string(), "lamp");
        assert_eq!(rows.rows[0][1].to_display_string(), "3");
    }

    #[test]
    fn test_statement_before_use_fails() {
        let mut replayer = replayer(0);
        replayer.apply_statement("CREATE TABLE t (a INTEGER)");
        assert_eq!(replayer.report(), ReplayReport { applied: 0, failed: 1 });
    }
}
