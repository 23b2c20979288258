//! Control surface
//!
//! Operator entry point of a node. Writes submitted here are applied locally
//! and then replicated: the primary broadcasts them to its sessions, a
//! secondary forwards them to its primary. Reads never leave the node.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use super::errors::{ControlError, ControlResult};
use crate::backend::{is_system_database, ColumnInfo, StorageBackend, Value};
use crate::executor::{run_blocking, ExecutorError, Placement, StatementExecutor};
use crate::observability::{Event, MetricsSnapshot};
use crate::replication::{BroadcastReport, NodeRole, PrimaryCoordinator, PrimaryLink, SessionInfo};
use crate::sql::{classify, database_command, is_valid_identifier};

/// Role allowed to submit CREATE/DROP on the primary
pub const MASTER_ROLE: &str = "master";

/// Where a locally-applied write goes next
#[derive(Debug, Clone)]
pub enum Replicator {
    /// Broadcast to every session
    Primary(Arc<PrimaryCoordinator>),
    /// Forward to the primary
    Secondary(PrimaryLink),
}

impl Replicator {
    pub fn role(&self) -> NodeRole {
        match self {
            Replicator::Primary(_) => NodeRole::Primary,
            Replicator::Secondary(_) => NodeRole::Secondary,
        }
    }
}

/// Result of [`ControlSurface::submit_statement`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatementOutcome {
    /// A SELECT; rows keyed by column name
    Rows {
        #[serde(rename = "data")]
        rows: Vec<JsonValue>,
    },
    /// Anything else
    Executed {
        #[serde(rename = "rows")]
        rows_affected: u64,
        placement: Placement,
        /// Fan-out result, primary only
        #[serde(skip_serializing_if = "Option::is_none")]
        replication: Option<BroadcastReport>,
    },
}

/// One column of a row returned by [`ControlSurface::get_row`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub value: String,
}

/// Node status for `/status`
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub role: NodeRole,
    /// Primary address, secondaries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Whether the link to the primary is still up, secondaries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    pub sessions: Vec<SessionInfo>,
    pub shard_count: usize,
    pub shard_map: BTreeMap<String, usize>,
    pub metrics: MetricsSnapshot,
}

/// Control surface of one node
#[derive(Debug, Clone)]
pub struct ControlSurface {
    executor: Arc<StatementExecutor>,
    replicator: Replicator,
}

impl ControlSurface {
    pub fn new(executor: Arc<StatementExecutor>, replicator: Replicator) -> Self {
        Self {
            executor,
            replicator,
        }
    }

    /// Control surface of a primary, sharing the coordinator's executor.
    pub fn primary(coordinator: Arc<PrimaryCoordinator>) -> Self {
        let executor = Arc::clone(coordinator.executor());
        Self::new(executor, Replicator::Primary(coordinator))
    }

    pub fn role(&self) -> NodeRole {
        self.replicator.role()
    }

    pub fn executor(&self) -> &Arc<StatementExecutor> {
        &self.executor
    }

    /// Run one statement submitted by an operator.
    ///
    /// `user_role` only matters on the primary, where CREATE/DROP need
    /// [`MASTER_ROLE`]. A secondary rejects CREATE/DROP from anyone.
    pub async fn submit_statement(
        &self,
        user_role: &str,
        database: &str,
        statement: &str,
    ) -> ControlResult<StatementOutcome> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Err(ControlError::MissingParameter("Query"));
        }

        let classified = classify(statement);
        if classified.kind.is_master_only() {
            let allowed = match &self.replicator {
                Replicator::Primary(_) => user_role == MASTER_ROLE,
                Replicator::Secondary(_) => false,
            };
            if !allowed {
                self.executor.metrics().increment_statements_rejected();
                info!(
                    event = %Event::StatementRejected,
                    role = %self.role(),
                    user_role,
                    statement,
                    "CREATE/DROP rejected"
                );
                return Err(ControlError::MasterOnly);
            }
        }

        let lifecycle = database_command(statement)
            .map(|command| command.is_database_lifecycle())
            .unwrap_or(false);
        if database.is_empty() && !lifecycle {
            return Err(ControlError::MissingParameter("Database name"));
        }

        if classified.kind.is_read() {
            let executor = Arc::clone(&self.executor);
            let (db, stmt) = (database.to_string(), statement.to_string());
            let rows = run_blocking(move || executor.query(&stmt, &db, &[])).await?;
            return Ok(StatementOutcome::Rows {
                rows: rows.to_json_objects(),
            });
        }

        let executor = Arc::clone(&self.executor);
        let (db, stmt) = (database.to_string(), statement.to_string());
        let execution = run_blocking(move || executor.execute(&stmt, &db)).await?;

        let replication = match &self.replicator {
            Replicator::Primary(coordinator) => Some(
                coordinator
                    .replicate(database, statement, &execution.placement, None)
                    .await,
            ),
            Replicator::Secondary(link) => {
                if let Err(e) = link.forward(database, statement).await {
                    warn!(database, statement, error = %e, "forward to primary failed");
                    return Err(ControlError::ForwardFailed(e.to_string()));
                }
                None
            }
        };

        Ok(StatementOutcome::Executed {
            rows_affected: execution.rows_affected,
            placement: execution.placement,
            replication,
        })
    }

    /// SHOW DATABASES without the engine's own databases.
    pub async fn list_databases(&self) -> ControlResult<Vec<String>> {
        let base = Arc::clone(self.executor.base());
        let names = run_blocking(move || Ok(base.list_databases()?)).await?;
        Ok(names
            .into_iter()
            .filter(|name| !is_system_database(name))
            .collect())
    }

    pub async fn list_tables(&self, database: &str) -> ControlResult<Vec<String>> {
        require(database, "Database name")?;
        let base = Arc::clone(self.executor.base());
        let db = database.to_string();
        let tables = run_blocking(move || {
            select(base.as_ref(), &db)?;
            Ok(base.list_tables(&db)?)
        })
        .await?;
        Ok(tables)
    }

    pub async fn describe_columns(
        &self,
        database: &str,
        table: &str,
    ) -> ControlResult<Vec<ColumnInfo>> {
        require(database, "Database name")?;
        require(table, "Table name")?;
        self.columns(database, table).await
    }

    /// Every `id` in `table`, as text.
    pub async fn list_row_ids(&self, database: &str, table: &str) -> ControlResult<Vec<String>> {
        require(database, "Database name")?;
        require(table, "Table name")?;
        check_table(table)?;

        let executor = Arc::clone(&self.executor);
        let db = database.to_string();
        let statement = format!("SELECT id FROM {}", table);
        let rows = run_blocking(move || executor.query(&statement, &db, &[])).await?;

        Ok(rows
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(Value::to_display_string)
            .collect())
    }

    /// Every column of one row except `id`, with its declared type.
    pub async fn get_row(
        &self,
        database: &str,
        table: &str,
        id: &str,
    ) -> ControlResult<Vec<RowField>> {
        require(database, "Database name")?;
        require(table, "Table name")?;
        require(id, "ID")?;

        let columns: Vec<ColumnInfo> = self
            .columns(database, table)
            .await?
            .into_iter()
            .filter(|column| column.name != "id")
            .collect();
        if columns.is_empty() {
            return Err(ControlError::NoColumns);
        }

        let names: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
        let statement = format!("SELECT {} FROM {} WHERE id = ?", names.join(", "), table);
        let param = id
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(id.to_string()));

        let executor = Arc::clone(&self.executor);
        let db = database.to_string();
        let rows = run_blocking(move || executor.query(&statement, &db, &[param])).await?;

        let row = rows
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| ControlError::RowNotFound(id.to_string()))?;

        Ok(columns
            .into_iter()
            .zip(row)
            .map(|(column, value)| RowField {
                name: column.name,
                data_type: column.data_type,
                value: value.to_display_string(),
            })
            .collect())
    }

    pub async fn status(&self) -> NodeStatus {
        let router = self.executor.router();
        let (primary, connected, sessions) = match &self.replicator {
            Replicator::Primary(coordinator) => (None, None, coordinator.sessions().await),
            Replicator::Secondary(link) => (
                Some(link.primary().to_string()),
                Some(link.is_connected()),
                Vec::new(),
            ),
        };

        NodeStatus {
            role: self.role(),
            primary,
            connected,
            sessions,
            shard_count: router.shard_count(),
            shard_map: router.snapshot(),
            metrics: self.executor.metrics().snapshot(),
        }
    }

    async fn columns(&self, database: &str, table: &str) -> ControlResult<Vec<ColumnInfo>> {
        check_table(table)?;
        let base = Arc::clone(self.executor.base());
        let (db, table) = (database.to_string(), table.to_string());
        let columns = run_blocking(move || {
            select(base.as_ref(), &db)?;
            Ok(base.describe_columns(&db, &table)?)
        })
        .await?;
        Ok(columns)
    }
}

fn require(value: &str, name: &'static str) -> ControlResult<()> {
    if value.trim().is_empty() {
        return Err(ControlError::MissingParameter(name));
    }
    Ok(())
}

fn check_table(table: &str) -> ControlResult<()> {
    if !is_valid_identifier(table) {
        return Err(ControlError::InvalidTable(table.to_string()));
    }
    Ok(())
}

fn select(backend: &dyn StorageBackend, database: &str) -> Result<(), ExecutorError> {
    backend
        .select_database(database)
        .map_err(|source| ExecutorError::SelectDatabase {
            database: database.to_string(),
            backend: backend.name().to_string(),
            source,
        })
}
