//! Statement executor

use std::sync::Arc;

use tracing::{debug, warn};

use super::errors::{ExecutorError, ExecutorResult};
use super::result::{Execution, Placement};
use crate::backend::{QueryRows, StorageBackend, Value};
use crate::observability::{Event, MetricsRegistry};
use crate::sharding::ShardRouter;
use crate::sql::{classify, database_command, DatabaseCommand};

/// Applies statements to the base backend or to a shard backend.
///
/// All calls block on the backend; async callers go through [`run_blocking`].
#[derive(Debug)]
pub struct StatementExecutor {
    base: Arc<dyn StorageBackend>,
    shards: Vec<Arc<dyn StorageBackend>>,
    router: Arc<ShardRouter>,
    mirror_schema: bool,
    metrics: Arc<MetricsRegistry>,
}

/// Target picked for one statement
struct Target<'a> {
    backend: &'a dyn StorageBackend,
    placement: Placement,
}

impl StatementExecutor {
    pub fn new(
        base: Arc<dyn StorageBackend>,
        shards: Vec<Arc<dyn StorageBackend>>,
        router: Arc<ShardRouter>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            base,
            shards,
            router,
            mirror_schema: true,
            metrics,
        }
    }

    /// Apply DDL to shard backends as well as to the base backend.
    pub fn with_schema_mirroring(mut self, enabled: bool) -> Self {
        self.mirror_schema = enabled;
        self
    }

    pub fn base(&self) -> &Arc<dyn StorageBackend> {
        &self.base
    }

    pub fn shards(&self) -> &[Arc<dyn StorageBackend>] {
        &self.shards
    }

    pub fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Apply one statement against `database`.
    ///
    /// Routable DML goes to its table's shard; everything else runs on the
    /// base backend. `CREATE DATABASE` / `DROP DATABASE` ignore `database`.
    pub fn execute(&self, statement: &str, database: &str) -> ExecutorResult<Execution> {
        let result = self.execute_inner(statement, database);
        self.record(statement, database, &result);
        result
    }

    fn execute_inner(&self, statement: &str, database: &str) -> ExecutorResult<Execution> {
        if let Some(command) = database_command(statement) {
            return self.execute_database_command(statement, command);
        }

        let classified = classify(statement);
        let target = self.target(statement, database)?;
        let rows_affected = target.backend.execute(Some(database), statement)?;

        if classified.kind.is_ddl() && matches!(target.placement, Placement::Base) {
            self.mirror(statement, Some(database));
        }

        Ok(Execution {
            rows_affected,
            placement: target.placement,
        })
    }

    /// Run a row-returning statement, routed like [`execute`](Self::execute).
    pub fn query(
        &self,
        statement: &str,
        database: &str,
        params: &[Value],
    ) -> ExecutorResult<QueryRows> {
        let target = self.target(statement, database)?;
        target
            .backend
            .query(database, statement, params)
            .map_err(ExecutorError::from)
    }

    /// Apply a statement on the base backend without consulting the router.
    ///
    /// Used for setup commands and for schema changes that arrive from the
    /// primary. DDL is still mirrored to the shards.
    pub fn execute_direct(&self, statement: &str, database: Option<&str>) -> ExecutorResult<u64> {
        let result = self
            .base
            .execute(database, statement)
            .map_err(ExecutorError::from);

        if result.is_ok() {
            let is_schema_change = database_command(statement)
                .map(|command| command.is_database_lifecycle())
                .unwrap_or_else(|| classify(statement).kind.is_ddl());
            if is_schema_change {
                self.mirror(statement, database);
            }
        }

        let outcome = result.map(Execution::on_base);
        self.record(statement, database.unwrap_or(""), &outcome);
        outcome.map(|execution| execution.rows_affected)
    }

    fn execute_database_command(
        &self,
        statement: &str,
        command: DatabaseCommand,
    ) -> ExecutorResult<Execution> {
        if let DatabaseCommand::Use(name) = &command {
            self.base.select_database(name)?;
            return Ok(Execution::on_base(0));
        }

        let rows_affected = self.base.execute(None, statement)?;
        self.mirror(statement, None);
        Ok(Execution::on_base(rows_affected))
    }

    fn target(&self, statement: &str, database: &str) -> ExecutorResult<Target<'_>> {
        let classified = classify(statement);

        let routed = match classified.table {
            Some(table) if classified.kind.is_routable() => self
                .router
                .route(&table)
                .and_then(|route| {
                    self.shards
                        .get(route.index)
                        .map(|shard| (shard, route, table))
                }),
            _ => None,
        };

        let target = match routed {
            Some((shard, route, table)) => {
                if route.newly_assigned {
                    self.metrics.increment_shard_assignments();
                }
                Target {
                    backend: shard.as_ref(),
                    placement: Placement::Shard {
                        index: route.index,
                        table,
                        newly_assigned: route.newly_assigned,
                    },
                }
            }
            None => Target {
                backend: self.base.as_ref(),
                placement: Placement::Base,
            },
        };

        target
            .backend
            .select_database(database)
            .map_err(|source| ExecutorError::SelectDatabase {
                database: database.to_string(),
                backend: target.backend.name().to_string(),
                source,
            })?;

        Ok(target)
    }

    /// Apply schema statements to every shard; failures are only logged.
    fn mirror(&self, statement: &str, database: Option<&str>) {
        if !self.mirror_schema {
            return;
        }
        for shard in &self.shards {
            if let Err(e) = shard.execute(database, statement) {
                warn!(
                    shard = shard.name(),
                    database = database.unwrap_or(""),
                    error = %e,
                    "schema mirror failed"
                );
            }
        }
    }

    fn record(&self, statement: &str, database: &str, result: &ExecutorResult<Execution>) {
        match result {
            Ok(execution) => {
                self.metrics.increment_statements_executed();
                debug!(
                    event = %Event::StatementExecuted,
                    database,
                    statement,
                    rows = execution.rows_affected,
                    "statement executed"
                );
            }
            Err(e) => {
                self.metrics.increment_statements_failed();
                debug!(
                    event = %Event::StatementFailed,
                    database,
                    statement,
                    error = %e,
                    "statement failed"
                );
            }
        }
    }
}

/// Run blocking executor work off the async runtime.
pub async fn run_blocking<T, F>(work: F) -> ExecutorResult<T>
where
    F: FnOnce() -> ExecutorResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ExecutorError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, SqliteBackend};
    use crate::sharding::AllocationPolicy;

    fn executor(shards: usize) -> StatementExecutor {
        let base: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::in_memory("base"));
        let shards = (0..shards)
            .map(|i| {
                Arc::new(SqliteBackend::in_memory(format!("shard{}", i + 1)))
                    as Arc<dyn StorageBackend>
            })
            .collect::<Vec<_>>();
        let router = Arc::new(ShardRouter::new(shards.len(), AllocationPolicy::RoundRobin));
        StatementExecutor::new(base, shards, router, Arc::new(MetricsRegistry::new()))
    }

    fn with_schema(executor: &StatementExecutor) {
        executor.execute("CREATE DATABASE shop", "").unwrap();
        executor
            .execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT)", "shop")
            .unwrap();
        executor
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", "shop")
            .unwrap();
    }

    #[test]
    fn test_dml_is_routed_round_robin() {
        let executor = executor(2);
        with_schema(&executor);

        let orders = executor
            .execute("INSERT INTO orders (item) VALUES ('lamp')", "shop")
            .unwrap();
        assert_eq!(orders.rows_affected, 1);
        assert_eq!(
            orders.placement,
            Placement::Shard {
                index: 0,
                table: "orders".to_string(),
                newly_assigned: true
            }
        );

        let users = executor
            .execute("INSERT INTO users (name) VALUES ('ann')", "shop")
            .unwrap();
        assert_eq!(users.placement.new_assignment(), Some(("users", 1)));

        let again = executor
            .execute("INSERT INTO orders (item) VALUES ('desk')", "shop")
            .unwrap();
        assert!(matches!(
            again.placement,
            Placement::Shard { index: 0, newly_assigned: false, .. }
        ));

        // rows live on the shard, not on the base backend
        let base_rows = executor
            .base()
            .query("shop", "SELECT * FROM orders", &[])
            .unwrap();
        assert!(base_rows.is_empty());
        let shard_rows = executor
            .query("SELECT item FROM orders", "shop", &[])
            .unwrap();
        assert_eq!(shard_rows.rows.len(), 2);
    }

    #[test]
    fn test_ddl_runs_on_base_and_is_mirrored() {
        let executor = executor(2);
        with_schema(&executor);

        assert_eq!(executor.base().list_tables("shop").unwrap(), vec!["orders", "users"]);
        for shard in executor.shards() {
            assert_eq!(shard.list_tables("shop").unwrap(), vec!["orders", "users"]);
        }
        assert!(executor.router().is_empty());
    }

    #[test]
    fn test_without_shards_everything_runs_on_base() {
        let executor = executor(0);
        with_schema(&executor);

        let execution = executor
            .execute("INSERT INTO orders (item) VALUES ('lamp')", "shop")
            .unwrap();
        assert_eq!(execution.placement, Placement::Base);
    }

    #[test]
    fn test_unknown_database_is_a_selection_error() {
        let executor = executor(2);
        let err = executor
            .execute("INSERT INTO orders (item) VALUES ('lamp')", "nope")
            .unwrap_err();
        assert!(err.is_selection());
        assert_eq!(executor.metrics().snapshot().statements_failed, 1);
    }

    #[test]
    fn test_backend_errors_are_returned_verbatim() {
        let executor = executor(0);
        with_schema(&executor);
        let err = executor.execute("INSERT INTO orders (nope) VALUES (1)", "shop").unwrap_err();
        match err {
            ExecutorError::Backend(BackendError::Statement(message)) => {
                assert!(message.contains("nope"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_execute_direct_skips_router() {
        let executor = executor(2);
        with_schema(&executor);

        executor
            .execute_direct("INSERT INTO orders (item) VALUES ('lamp')", Some("shop"))
            .unwrap();
        assert!(executor.router().is_empty());
        let base_rows = executor
            .base()
            .query("shop", "SELECT * FROM orders", &[])
            .unwrap();
        assert_eq!(base_rows.rows.len(), 1);
    }

    #[test]
    fn test_mirroring_can_be_disabled() {
        let executor = executor(1).with_schema_mirroring(false);
        executor.execute("CREATE DATABASE shop", "").unwrap();
        assert!(executor.shards()[0].list_databases().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let executor = Arc::new(executor(0));
        let worker = Arc::clone(&executor);
        let execution = run_blocking(move || worker.execute("CREATE DATABASE shop", ""))
            .await
            .unwrap();
        assert_eq!(execution.rows_affected, 1);
    }
}
