//! Shared helpers for integration tests: in-memory nodes, a primary on an
//! ephemeral port and a hand-driven secondary connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shardrelay::backend::{SqliteBackend, StorageBackend};
use shardrelay::executor::StatementExecutor;
use shardrelay::observability::MetricsRegistry;
use shardrelay::protocol::{reply, Frame, FrameCodec};
use shardrelay::replication::{
    CoordinationConfig, PrimaryCoordinator, PrimaryServer, SessionState,
};
use shardrelay::sharding::{AllocationPolicy, ShardRouter};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Executor over in-memory backends with `shards` shard backends.
pub fn executor(shards: usize, policy: AllocationPolicy) -> Arc<StatementExecutor> {
    let base: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::in_memory("base"));
    let shards = (0..shards)
        .map(|i| {
            Arc::new(SqliteBackend::in_memory(format!("shard{}", i + 1))) as Arc<dyn StorageBackend>
        })
        .collect::<Vec<_>>();
    let router = Arc::new(ShardRouter::new(shards.len(), policy));
    Arc::new(StatementExecutor::new(
        base,
        shards,
        router,
        Arc::new(MetricsRegistry::new()),
    ))
}

/// Coordination settings for tests: ephemeral port, short ack timeout.
pub fn coordination() -> CoordinationConfig {
    CoordinationConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ack_timeout_ms: 1000,
        sync_chunk_bytes: 256,
        ..Default::default()
    }
}

/// A running primary; dropping `stop` shuts it down.
pub struct TestPrimary {
    pub addr: SocketAddr,
    pub coordinator: Arc<PrimaryCoordinator>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestPrimary {
    pub async fn start(executor: Arc<StatementExecutor>, setup: Vec<String>) -> Self {
        Self::start_with(executor, coordination(), setup).await
    }

    pub async fn start_with(
        executor: Arc<StatementExecutor>,
        config: CoordinationConfig,
        setup: Vec<String>,
    ) -> Self {
        let coordinator = Arc::new(PrimaryCoordinator::new(executor, config, setup));
        let server = PrimaryServer::bind(Arc::clone(&coordinator)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async move {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            coordinator,
            stop: Some(tx),
            task,
        }
    }

    /// Wait until `count` sessions are active.
    pub async fn wait_active(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            loop {
                let active = self
                    .coordinator
                    .sessions()
                    .await
                    .iter()
                    .filter(|session| session.state == SessionState::Active)
                    .count();
                if active >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sessions did not become active");
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = tokio::time::timeout(WAIT, &mut self.task).await;
    }
}

/// A secondary connection driven frame by frame.
pub struct RawSecondary {
    stream: TcpStream,
    codec: FrameCodec,
}

impl RawSecondary {
    /// Connect and answer `setup_count` setup frames with `OK`.
    pub async fn connect(addr: SocketAddr, setup_count: usize) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut secondary = Self {
            stream,
            codec: FrameCodec::default(),
        };
        for _ in 0..setup_count {
            match secondary.recv().await {
                Frame::Setup(_) => secondary.send(Frame::reply(reply::OK)).await,
                other => panic!("expected setup frame, got {:?}", other),
            }
        }
        secondary
    }

    pub async fn send(&mut self, frame: Frame) {
        self.codec.write_frame(&mut self.stream, &frame).await.unwrap();
    }

    /// Next frame, failing the test after [`WAIT`].
    pub async fn recv(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.codec.read_frame(&mut self.stream))
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed")
    }

    /// Next frame if one arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Frame> {
        match tokio::time::timeout(wait, self.codec.read_frame(&mut self.stream)).await {
            Ok(result) => result.unwrap(),
            Err(_) => None,
        }
    }
}
