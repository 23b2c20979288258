//! Secondary side of the coordination channel
//!
//! A secondary dials its primary once, optionally bootstraps with a full
//! sync, then applies whatever the primary sends. Writes accepted by its own
//! control surface are applied locally and forwarded through the same
//! connection. There is no reconnection: losing the primary ends the link.

use std::future::Future;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::CoordinationConfig;
use super::errors::{ReplicationError, ReplicationResult};
use super::session::{spawn_writer, Outbound};
use crate::executor::{run_blocking, StatementExecutor};
use crate::observability::{Event, MetricsRegistry};
use crate::protocol::{reply, Frame, FrameCodec};
use crate::sql::classify;
use crate::sync::{ReplayReport, SnapshotReplayer, SyncError};

/// Handle used to send frames to the primary. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PrimaryLink {
    primary: String,
    outbound: mpsc::Sender<Outbound>,
    metrics: Arc<MetricsRegistry>,
}

impl PrimaryLink {
    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue `database|statement` for the primary.
    pub async fn forward(&self, database: &str, statement: &str) -> ReplicationResult<()> {
        self.send(Frame::statement(database, statement)).await?;
        self.metrics.increment_forwards();
        debug!(event = %Event::Forwarded, database, statement, "forwarded to primary");
        Ok(())
    }

    async fn send(&self, frame: Frame) -> ReplicationResult<()> {
        self.outbound
            .send(Outbound::frame(frame))
            .await
            .map_err(|_| ReplicationError::ConnectionClosed(self.primary.clone()))
    }
}

/// Connection to the primary: read half plus the writer-backed link.
pub struct SecondaryNode {
    link: PrimaryLink,
    reader: OwnedReadHalf,
    writer: JoinHandle<()>,
    codec: FrameCodec,
    executor: Arc<StatementExecutor>,
}

impl SecondaryNode {
    /// Dial `primary` (`host:port`).
    pub async fn connect(
        primary: &str,
        executor: Arc<StatementExecutor>,
        config: &CoordinationConfig,
    ) -> ReplicationResult<Self> {
        let stream = TcpStream::connect(primary)
            .await
            .map_err(|e| ReplicationError::Connect {
                addr: primary.to_string(),
                reason: e.to_string(),
            })?;
        let codec = config.codec();
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(config.outbound_queue_depth);
        let writer = spawn_writer(writer, codec, rx, primary.to_string());

        info!(event = %Event::LinkEstablished, primary, "connected to primary");

        Ok(Self {
            link: PrimaryLink {
                primary: primary.to_string(),
                outbound: tx,
                metrics: Arc::clone(executor.metrics()),
            },
            reader,
            writer,
            codec,
            executor,
        })
    }

    pub fn link(&self) -> PrimaryLink {
        self.link.clone()
    }

    /// Request the primary's snapshot and replay it before anything else.
    ///
    /// Setup commands are answered as they arrive; replicated statements are
    /// applied after the replay, in arrival order. An `Error..` reply from
    /// the primary fails the sync.
    pub async fn full_sync(&mut self) -> ReplicationResult<ReplayReport> {
        info!(event = %Event::FullSyncStart, primary = %self.link.primary, "requesting full sync");
        self.link.send(Frame::FullSyncRequest).await?;

        let mut replayer = SnapshotReplayer::new(Arc::clone(&self.executor));
        let mut deferred = Vec::new();

        let expected = loop {
            let frame = match self.codec.read_frame(&mut self.reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(SyncError::ConnectionClosed.into()),
                Err(e) if e.kind().closes_connection() => return Err(SyncError::from(e).into()),
                Err(e) => {
                    warn!(error = %e, "malformed frame during full sync");
                    continue;
                }
            };

            match frame {
                Frame::FullSyncChunk(chunk) => {
                    replayer = run_blocking(move || {
                        replayer.apply_chunk(&chunk);
                        Ok(replayer)
                    })
                    .await?;
                }
                Frame::ShardMap { table, index } => {
                    self.executor.router().pin(&table, index);
                }
                Frame::FullSyncEnd(count) => break count,
                Frame::Setup(statement) => {
                    let answer = apply_setup(&self.executor, statement).await;
                    self.link.send(answer).await?;
                }
                Frame::Reply(text) if reply::is_error(&text) => {
                    warn!(event = %Event::FullSyncFailed, reply = %text, "primary rejected full sync");
                    return Err(SyncError::Rejected(text).into());
                }
                Frame::Reply(text) => debug!(reply = %text, "reply during full sync"),
                statement @ Frame::Statement { .. } => deferred.push(statement),
                Frame::FullSyncRequest => debug!("ignoring FULL_SYNC request from primary"),
            }
        };

        let report = replayer.report();
        let metrics = self.executor.metrics();
        metrics.add_sync_statements_applied(report.applied);
        metrics.add_sync_statements_failed(report.failed);
        if report.total() != expected {
            warn!(expected, replayed = report.total(), "full sync statement count mismatch");
        }
        info!(
            event = %Event::FullSyncComplete,
            applied = report.applied,
            failed = report.failed,
            "full sync complete"
        );

        for frame in deferred {
            self.handle_frame(frame).await?;
        }
        Ok(report)
    }

    /// Apply frames from the primary until the link closes or `shutdown`
    /// resolves. Losing the primary is an error.
    pub async fn run_until<F>(mut self, shutdown: F) -> ReplicationResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        info!(event = %Event::Serving, primary = %self.link.primary, "following primary");

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(event = %Event::ShutdownStart, "secondary link shutting down");
                    break Ok(());
                }
                read = self.codec.read_frame(&mut self.reader) => {
                    match read {
                        Ok(Some(frame)) => {
                            if let Err(e) = self.handle_frame(frame).await {
                                break Err(e);
                            }
                        }
                        Ok(None) => {
                            break Err(ReplicationError::ConnectionClosed(self.link.primary.clone()))
                        }
                        Err(e) if e.kind().closes_connection() => break Err(e.into()),
                        Err(e) => warn!(error = %e, "malformed frame from primary"),
                    }
                }
            }
        };

        if let Err(e) = &result {
            warn!(event = %Event::LinkLost, primary = %self.link.primary, error = %e, "lost primary");
        }
        self.writer.abort();
        result
    }

    async fn handle_frame(&mut self, frame: Frame) -> ReplicationResult<()> {
        match frame {
            Frame::Setup(statement) => {
                let answer = apply_setup(&self.executor, statement).await;
                self.link.send(answer).await
            }
            Frame::Statement {
                database,
                statement,
            } => {
                apply_replicated(&self.executor, database, statement).await;
                Ok(())
            }
            Frame::ShardMap { table, index } => {
                self.executor.router().pin(&table, index);
                Ok(())
            }
            Frame::Reply(text) => {
                if reply::is_error(&text) {
                    warn!(reply = %text, "primary reported an error");
                } else {
                    debug!(reply = %text, "reply from primary");
                }
                Ok(())
            }
            other => {
                debug!(verb = other.verb(), "ignoring unexpected frame");
                Ok(())
            }
        }
    }
}

/// Apply a `master|` setup command on the base backend and build the reply.
async fn apply_setup(executor: &Arc<StatementExecutor>, statement: String) -> Frame {
    let worker = Arc::clone(executor);
    let stmt = statement.clone();
    match run_blocking(move || worker.execute_direct(&stmt, None)).await {
        Ok(_) => Frame::reply(reply::OK),
        Err(e) => {
            warn!(statement = %statement, error = %e, "setup command failed");
            Frame::reply(reply::error(e))
        }
    }
}

/// Apply a statement replicated by the primary. CREATE/DROP run directly on
/// the base backend; everything else goes through the router.
async fn apply_replicated(executor: &Arc<StatementExecutor>, database: String, statement: String) {
    let worker = Arc::clone(executor);
    let (db, stmt) = (database.clone(), statement.clone());
    let result = run_blocking(move || {
        if classify(&stmt).kind.is_master_only() {
            worker.execute_direct(&stmt, Some(&db))
        } else {
            worker.execute(&stmt, &db).map(|execution| execution.rows_affected)
        }
    })
    .await;

    match result {
        Ok(rows) => debug!(database = %database, statement = %statement, rows, "applied replicated statement"),
        Err(e) => warn!(database = %database, statement = %statement, error = %e, "replicated statement failed"),
    }
}
