//! Primary side of the coordination channel
//!
//! Accepts secondaries, runs the setup handshake, serves full syncs and fans
//! every locally-applied write out to the other sessions.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::broadcast::{fan_out, AckPolicy, BroadcastReport};
use super::config::CoordinationConfig;
use super::errors::{ReplicationError, ReplicationResult};
use super::session::{
    spawn_writer, CloseReason, Outbound, SessionHandle, SessionId, SessionInfo, SessionRegistry,
    SessionState,
};
use crate::executor::{run_blocking, Placement, StatementExecutor};
use crate::observability::Event;
use crate::protocol::{reply, Frame, FrameCodec};
use crate::sql::{classify, database_command, DatabaseCommand};
use crate::sync::SnapshotStream;

/// Shared primary state: executor, session registry and settings.
#[derive(Debug)]
pub struct PrimaryCoordinator {
    executor: Arc<StatementExecutor>,
    registry: SessionRegistry,
    config: CoordinationConfig,
    setup_statements: Vec<String>,
}

impl PrimaryCoordinator {
    /// `setup_statements` are sent to every secondary as `master|..` frames
    /// during the handshake.
    pub fn new(
        executor: Arc<StatementExecutor>,
        config: CoordinationConfig,
        setup_statements: Vec<String>,
    ) -> Self {
        let registry = SessionRegistry::new(Arc::clone(executor.metrics()));
        Self {
            executor,
            registry,
            config,
            setup_statements,
        }
    }

    /// One `CREATE DATABASE IF NOT EXISTS <shard>` per configured shard.
    pub fn shard_setup_statements<'a>(shard_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        shard_names
            .into_iter()
            .map(|name| format!("CREATE DATABASE IF NOT EXISTS {}", name))
            .collect()
    }

    pub fn executor(&self) -> &Arc<StatementExecutor> {
        &self.executor
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.snapshot().await
    }

    /// Forward a locally-applied statement to every session but `origin`.
    ///
    /// A table assigned by this statement is announced to every session
    /// first, originator included.
    pub async fn replicate(
        &self,
        database: &str,
        statement: &str,
        placement: &Placement,
        origin: Option<SessionId>,
    ) -> BroadcastReport {
        if self.config.share_shard_map {
            if let Some((table, index)) = placement.new_assignment() {
                let announcement = Frame::ShardMap {
                    table: table.to_string(),
                    index,
                };
                fan_out(
                    &self.registry,
                    &announcement,
                    None,
                    AckPolicy::None,
                    self.config.ack_timeout(),
                )
                .await;
            }
        }

        let frame = Frame::statement(wire_database(database, statement), statement);
        let report = fan_out(
            &self.registry,
            &frame,
            origin,
            self.config.ack_policy,
            self.config.ack_timeout(),
        )
        .await;

        if report.failed > 0 || report.evicted > 0 {
            warn!(
                database,
                failed = report.failed,
                evicted = report.evicted,
                "replication did not reach every secondary"
            );
        }
        report
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> ReplicationResult<()> {
        let codec = self.config.codec();
        let (mut reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_depth);
        let writer = spawn_writer(writer, codec, rx, peer.to_string());

        let id = SessionId::new();
        self.registry
            .register(SessionHandle::new(id, peer, tx.clone(), writer))
            .await;

        let result = self.serve_session(id, &mut reader, codec, &tx).await;
        self.registry.remove(id, CloseReason::Disconnected).await;
        result
    }

    async fn serve_session(
        &self,
        id: SessionId,
        reader: &mut OwnedReadHalf,
        codec: FrameCodec,
        tx: &mpsc::Sender<Outbound>,
    ) -> ReplicationResult<()> {
        self.registry.transition(id, SessionState::Handshaking).await?;
        let held = match self.handshake(id, reader, codec, tx).await {
            Ok(held) => held,
            Err(e) => {
                warn!(event = %Event::HandshakeFailed, session = %id, error = %e, "handshake failed");
                return Err(e);
            }
        };
        self.registry.transition(id, SessionState::Active).await?;
        info!(event = %Event::HandshakeComplete, session = %id, "secondary active");

        for frame in held {
            self.handle_frame(id, frame, tx).await?;
        }

        loop {
            match codec.read_frame(reader).await {
                Ok(Some(frame)) => self.handle_frame(id, frame, tx).await?,
                Ok(None) => return Ok(()),
                Err(e) if e.kind().closes_connection() => return Err(e.into()),
                Err(e) => {
                    debug!(session = %id, error = %e, "malformed frame");
                    send(tx, Frame::reply(reply::INVALID_REQUEST)).await?;
                }
            }
        }
    }

    /// Send every setup statement and wait for one acknowledgment (`OK` or
    /// `Error..`) each. Other bare frames are answered with `Invalid request`;
    /// requests are returned for processing once the session is active.
    async fn handshake(
        &self,
        id: SessionId,
        reader: &mut OwnedReadHalf,
        codec: FrameCodec,
        tx: &mpsc::Sender<Outbound>,
    ) -> ReplicationResult<Vec<Frame>> {
        let mut held = Vec::new();

        for statement in &self.setup_statements {
            send(tx, Frame::Setup(statement.clone())).await?;

            loop {
                match codec.read_frame(reader).await {
                    Ok(Some(Frame::Reply(text))) if reply::is_setup_ack(&text) => {
                        if reply::is_error(&text) {
                            warn!(session = %id, statement = %statement, reply = %text, "setup command failed on secondary");
                        }
                        break;
                    }
                    Ok(Some(Frame::Reply(text))) => {
                        debug!(session = %id, reply = %text, "not a setup acknowledgment");
                        send(tx, Frame::reply(reply::INVALID_REQUEST)).await?;
                    }
                    Ok(Some(frame)) => held.push(frame),
                    Ok(None) => return Err(ReplicationError::ConnectionClosed(id.to_string())),
                    Err(e) if e.kind().closes_connection() => return Err(e.into()),
                    Err(e) => debug!(session = %id, error = %e, "malformed frame during handshake"),
                }
            }
        }

        Ok(held)
    }

    async fn handle_frame(
        &self,
        id: SessionId,
        frame: Frame,
        tx: &mpsc::Sender<Outbound>,
    ) -> ReplicationResult<()> {
        match frame {
            Frame::FullSyncRequest => self.serve_full_sync(id, tx).await,
            Frame::Statement {
                database,
                statement,
            } => {
                let answer = self.apply_forwarded(id, database, statement).await;
                send(tx, Frame::reply(answer)).await
            }
            // replies, setup commands and sync frames are never requests
            _ => send(tx, Frame::reply(reply::INVALID_REQUEST)).await,
        }
    }

    async fn apply_forwarded(&self, id: SessionId, database: String, statement: String) -> String {
        if classify(&statement).kind.is_master_only() {
            self.executor.metrics().increment_statements_rejected();
            info!(
                event = %Event::StatementRejected,
                session = %id,
                database = %database,
                statement = %statement,
                "CREATE/DROP from a secondary rejected"
            );
            return reply::MASTER_ONLY.to_string();
        }

        let executor = Arc::clone(&self.executor);
        let (db, stmt) = (database.clone(), statement.clone());
        match run_blocking(move || executor.execute(&stmt, &db)).await {
            Ok(execution) => {
                self.replicate(&database, &statement, &execution.placement, Some(id))
                    .await;
                reply::rows_affected(execution.rows_affected)
            }
            Err(e) if e.is_selection() => reply::selection_failed(e),
            Err(e) => reply::execution_failed(e),
        }
    }

    async fn serve_full_sync(&self, id: SessionId, tx: &mpsc::Sender<Outbound>) -> ReplicationResult<()> {
        info!(event = %Event::FullSyncStart, session = %id, "serving full sync");

        let assignments = if self.config.share_shard_map {
            self.executor.router().snapshot().into_iter().collect()
        } else {
            Vec::new()
        };
        let mut stream = SnapshotStream::start(
            Arc::clone(self.executor.base()),
            self.executor.shards().to_vec(),
            assignments,
            self.config.sync_chunk_bytes,
        );

        loop {
            match stream.next_frame().await {
                Ok(Some(frame)) => send(tx, frame).await?,
                Ok(None) => break,
                Err(e) => {
                    warn!(event = %Event::FullSyncFailed, session = %id, error = %e, "full sync failed");
                    return send(tx, Frame::reply(reply::sync_failed(e))).await;
                }
            }
        }

        self.executor.metrics().increment_full_syncs_served();
        info!(
            event = %Event::FullSyncComplete,
            session = %id,
            statements = stream.statement_count(),
            "full sync served"
        );
        Ok(())
    }
}

/// Database name for the wire. Database-level commands may arrive without
/// one; they carry the name they act on so the frame stays well-formed.
fn wire_database(database: &str, statement: &str) -> String {
    if !database.is_empty() {
        return database.to_string();
    }
    match database_command(statement) {
        Some(DatabaseCommand::Create { name, .. })
        | Some(DatabaseCommand::Drop { name, .. })
        | Some(DatabaseCommand::Use(name)) => name,
        None => database.to_string(),
    }
}

async fn send(tx: &mpsc::Sender<Outbound>, frame: Frame) -> ReplicationResult<()> {
    tx.send(Outbound::frame(frame))
        .await
        .map_err(|_| ReplicationError::ConnectionClosed("secondary".to_string()))
}

/// Coordination listener of the primary
pub struct PrimaryServer {
    listener: TcpListener,
    coordinator: Arc<PrimaryCoordinator>,
}

impl PrimaryServer {
    pub fn new(listener: TcpListener, coordinator: Arc<PrimaryCoordinator>) -> Self {
        Self {
            listener,
            coordinator,
        }
    }

    /// Bind `coordination.listen_addr`.
    pub async fn bind(coordinator: Arc<PrimaryCoordinator>) -> ReplicationResult<Self> {
        let addr = coordinator.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ReplicationError::Bind {
                addr,
                reason: e.to_string(),
            })?;
        Ok(Self::new(listener, coordinator))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn coordinator(&self) -> &Arc<PrimaryCoordinator> {
        &self.coordinator
    }

    /// Accept secondaries until `shutdown` resolves, then close every session.
    pub async fn run_until<F>(self, shutdown: F) -> ReplicationResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let PrimaryServer {
            listener,
            coordinator,
        } = self;
        tokio::pin!(shutdown);

        if let Ok(addr) = listener.local_addr() {
            info!(event = %Event::Serving, addr = %addr, "coordination listener ready");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(event = %Event::ShutdownStart, "coordination listener shutting down");
                    coordinator.registry.close_all().await;
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => spawn_session(stream, peer, &coordinator),
                        Err(e) => warn!(error = %e, "failed to accept connection"),
                    }
                }
            }
        }

        Ok(())
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, coordinator: &Arc<PrimaryCoordinator>) {
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move {
        if let Err(e) = coordinator.handle_connection(stream, peer).await {
            debug!(peer = %peer, error = %e, "session ended with error");
        }
    });
}
