//! Snapshot producer
//!
//! Walks every non-system database on the base backend and emits a
//! replayable statement stream: `CREATE DATABASE IF NOT EXISTS`, `USE`, each
//! table's create statement, then one `INSERT` per row. Rows are read from the
//! base backend and from every shard backend that holds the table.
//!
//! Tables are read one after another without a cross-table transaction, so
//! the snapshot is best-effort under concurrent writes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::errors::{SyncError, SyncResult};
use crate::backend::{is_system_database, QueryRows, StorageBackend};
use crate::protocol::Frame;
use crate::sql::{quote_identifier, render_literal};

/// Statements buffered between the snapshot worker and the network
const STREAM_DEPTH: usize = 256;

/// Emit the snapshot of `base` (plus shard rows) through `emit`.
///
/// Returns the number of statements emitted.
pub fn produce_snapshot<F>(
    base: &dyn StorageBackend,
    shards: &[Arc<dyn StorageBackend>],
    mut emit: F,
) -> SyncResult<u64>
where
    F: FnMut(String) -> SyncResult<()>,
{
    let mut count = 0u64;
    let mut push = |statement: String| -> SyncResult<()> {
        count += 1;
        emit(statement)
    };

    for database in base.list_databases()? {
        if is_system_database(&database) {
            continue;
        }

        push(format!("CREATE DATABASE IF NOT EXISTS {}", database))?;
        push(format!("USE {}", database))?;

        for table in base.list_tables(&database)? {
            push(base.show_create_table(&database, &table)?)?;

            let rows = read_table(base, &database, &table)?;
            for statement in insert_statements(&table, &rows) {
                push(statement)?;
            }

            for shard in shards {
                // a shard that never saw this table simply has nothing to add
                match read_table(shard.as_ref(), &database, &table) {
                    Ok(rows) => {
                        for statement in insert_statements(&table, &rows) {
                            push(statement)?;
                        }
                    }
                    Err(e) => {
                        debug!(shard = shard.name(), database = %database, table = %table, error = %e, "skipping shard rows")
                    }
                }
            }
        }
    }

    Ok(count)
}

fn read_table(
    backend: &dyn StorageBackend,
    database: &str,
    table: &str,
) -> SyncResult<QueryRows> {
    let statement = format!("SELECT * FROM {}", quote_identifier(table));
    Ok(backend.query(database, &statement, &[])?)
}

/// One `INSERT INTO "table" ("cols") VALUES (literals)` per row.
/// Table and column names are always double-quoted.
pub fn insert_statements(table: &str, rows: &QueryRows) -> Vec<String> {
    let table = quote_identifier(table);
    let columns = rows
        .columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    rows.rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row.iter().map(render_literal).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns,
                values.join(", ")
            )
        })
        .collect()
}

/// Packs statements into `FULL_SYNC` chunks of bounded size.
///
/// Chunks break at statement boundaries; a single statement larger than the
/// bound travels alone.
#[derive(Debug)]
pub struct ChunkPacker {
    limit: usize,
    current: String,
}

impl ChunkPacker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            current: String::new(),
        }
    }

    /// Add a statement; returns a finished chunk when the current one is full.
    pub fn push(&mut self, statement: &str) -> Option<String> {
        let entry_len = statement.len() + 2;
        let flushed = if !self.current.is_empty() && self.current.len() + entry_len > self.limit {
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };

        self.current.push_str(statement);
        self.current.push_str(";\n");
        flushed
    }

    /// Remaining partial chunk, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

enum StreamState {
    ShardMap,
    Chunks,
    End,
    Done,
}

/// Frame sequence answering one `FULL_SYNC|` request.
///
/// `SHARD_MAP` frames first (so replayed rows land on the announced shards),
/// then `FULL_SYNC` chunks, then `FULL_SYNC_END|<count>`. The snapshot itself
/// is produced on a blocking worker; memory is bounded by the channel depth.
/// Dropping the stream makes the worker's next send fail, which stops it.
pub struct SnapshotStream {
    state: StreamState,
    assignments: std::vec::IntoIter<(String, usize)>,
    statements: mpsc::Receiver<String>,
    worker: Option<JoinHandle<SyncResult<u64>>>,
    packer: ChunkPacker,
    count: u64,
}

impl SnapshotStream {
    /// Start producing a snapshot of `base` and `shards`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        base: Arc<dyn StorageBackend>,
        shards: Vec<Arc<dyn StorageBackend>>,
        assignments: Vec<(String, usize)>,
        chunk_bytes: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_DEPTH);
        let worker = tokio::task::spawn_blocking(move || {
            produce_snapshot(base.as_ref(), &shards, |statement| {
                tx.blocking_send(statement).map_err(|_| SyncError::Aborted)
            })
        });

        Self {
            state: StreamState::ShardMap,
            assignments: assignments.into_iter(),
            statements: rx,
            worker: Some(worker),
            packer: ChunkPacker::new(chunk_bytes),
            count: 0,
        }
    }

    /// Next frame to send, or `None` once `FULL_SYNC_END` has been produced.
    pub async fn next_frame(&mut self) -> SyncResult<Option<Frame>> {
        loop {
            match self.state {
                StreamState::ShardMap => match self.assignments.next() {
                    Some((table, index)) => return Ok(Some(Frame::ShardMap { table, index })),
                    None => self.state = StreamState::Chunks,
                },
                StreamState::Chunks => match self.statements.recv().await {
                    Some(statement) => {
                        if let Some(chunk) = self.packer.push(&statement) {
                            return Ok(Some(Frame::FullSyncChunk(chunk)));
                        }
                    }
                    None => {
                        self.count = self.join_worker().await?;
                        self.state = StreamState::End;
                        if let Some(chunk) = self.packer.finish() {
                            return Ok(Some(Frame::FullSyncChunk(chunk)));
                        }
                    }
                },
                StreamState::End => {
                    self.state = StreamState::Done;
                    return Ok(Some(Frame::FullSyncEnd(self.count)));
                }
                StreamState::Done => return Ok(None),
            }
        }
    }

    /// Statements produced so far; final once the stream is exhausted.
    pub fn statement_count(&self) -> u64 {
        self.count
    }

    async fn join_worker(&mut self) -> SyncResult<u64> {
        match self.worker.take() {
            Some(worker) => worker
                .await
                .map_err(|e| SyncError::Worker(e.to_string()))?,
            None => Ok(self.count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SqliteBackend, Value};

    fn populated() -> Arc<dyn StorageBackend> {
        let base = SqliteBackend::in_memory("base");
        base.execute(None, "CREATE DATABASE shop").unwrap();
        base.execute(
            Some("shop"),
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT, note TEXT)",
        )
        .unwrap();
        base.execute(
            Some("shop"),
            "INSERT INTO orders (id, item, note) VALUES (1, 'O''Brien; lamp', NULL)",
        )
        .unwrap();
        Arc::new(base)
    }

    #[test]
    fn test_snapshot_statement_order() {
        let base = populated();
        let mut statements = Vec::new();
        let count = produce_snapshot(base.as_ref(), &[], |s| {
            statements.push(s);
            Ok(())
        })
        .unwrap();

        assert_eq!(count, 4);
        assert_eq!(statements[0], "CREATE DATABASE IF NOT EXISTS shop");
        assert_eq!(statements[1], "USE shop");
        assert!(statements[2].starts_with("CREATE TABLE orders"));
        assert_eq!(
            statements[3],
            r#"INSERT INTO "orders" ("id", "item", "note") VALUES (1, 'O''Brien; lamp', NULL)"#
        );
    }

    #[test]
    fn test_snapshot_includes_shard_rows() {
        let base = populated();
        let shard = SqliteBackend::in_memory("shard1");
        shard.execute(None, "CREATE DATABASE shop").unwrap();
        shard
            .execute(
                Some("shop"),
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT, note TEXT)",
            )
            .unwrap();
        shard
            .execute(Some("shop"), "INSERT INTO orders (id, item) VALUES (2, 'desk')")
            .unwrap();
        let empty_shard: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::in_memory("shard2"));
        let shards: Vec<Arc<dyn StorageBackend>> = vec![Arc::new(shard), empty_shard];

        let mut statements = Vec::new();
        produce_snapshot(base.as_ref(), &shards, |s| {
            statements.push(s);
            Ok(())
        })
        .unwrap();

        assert_eq!(
            statements.last().map(String::as_str),
            Some(r#"INSERT INTO "orders" ("id", "item", "note") VALUES (2, 'desk', NULL)"#)
        );
    }

    #[test]
    fn test_system_databases_are_skipped() {
        let base = SqliteBackend::in_memory("base");
        base.execute(None, "CREATE DATABASE mysql").unwrap();
        let count = produce_snapshot(&base, &[], |_| Ok(())).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_insert_statement_literals() {
        let rows = QueryRows {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![Value::Blob(vec![1, 2]), Value::Real(1.5)]],
        };
        assert_eq!(
            insert_statements("t", &rows),
            vec![r#"INSERT INTO "t" ("a", "b") VALUES (X'0102', 1.5)"#]
        );
    }

    #[test]
    fn test_chunk_packer_breaks_at_statement_boundaries() {
        let mut packer = ChunkPacker::new(20);
        assert_eq!(packer.push("USE shop"), None);
        assert_eq!(packer.push("USE other"), Some("USE shop;\n".to_string()));
        assert_eq!(packer.push(&"x".repeat(50)), Some("USE other;\n".to_string()));
        assert_eq!(packer.finish(), Some(format!("{};\n", "x".repeat(50))));
        assert_eq!(packer.finish(), None);
    }

    #[tokio::test]
    async fn test_stream_frame_order() {
        let base = populated();
        let mut stream = SnapshotStream::start(
            base,
            Vec::new(),
            vec![("orders".to_string(), 1)],
            64 * 1024,
        );

        let mut frames = Vec::new();
        while let Some(frame) = stream.next_frame().await.unwrap() {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[0],
            Frame::ShardMap {
                table: "orders".to_string(),
                index: 1
            }
        );
        match &frames[1] {
            Frame::FullSyncChunk(chunk) => assert!(chunk.starts_with("CREATE DATABASE IF NOT EXISTS shop;\nUSE shop;\n")),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(frames[2], Frame::FullSyncEnd(4));
        assert_eq!(stream.statement_count(), 4);
    }
}
