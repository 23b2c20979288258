//! Node startup and serving loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::NodeConfig;
use super::errors::{NodeError, NodeResult};
use crate::backend::{SqliteBackend, StorageBackend};
use crate::control::{ControlSurface, Replicator};
use crate::executor::StatementExecutor;
use crate::http_server::HttpServer;
use crate::observability::{Event, MetricsRegistry};
use crate::replication::{NodeRole, PrimaryCoordinator, PrimaryServer, SecondaryNode};
use crate::sharding::ShardRouter;

/// Open the base and shard backends and wire the executor over them.
pub fn build_executor(config: &NodeConfig) -> NodeResult<Arc<StatementExecutor>> {
    let base: Arc<dyn StorageBackend> = if config.storage.in_memory {
        Arc::new(SqliteBackend::in_memory("base"))
    } else {
        Arc::new(SqliteBackend::open("base", &config.storage.data_dir)?)
    };

    let mut shards: Vec<Arc<dyn StorageBackend>> = Vec::with_capacity(config.shards.len());
    for (index, shard) in config.shards.iter().enumerate() {
        let backend = match config.shard_dir(index) {
            Some(dir) if !config.storage.in_memory => SqliteBackend::open(&shard.name, dir)?,
            _ => SqliteBackend::in_memory(&shard.name),
        };
        shards.push(Arc::new(backend));
    }

    let router = Arc::new(ShardRouter::new(
        shards.len(),
        config.role.allocation_policy(),
    ));
    let executor = StatementExecutor::new(base, shards, router, Arc::new(MetricsRegistry::new()))
        .with_schema_mirroring(config.storage.mirror_schema_to_shards);

    Ok(Arc::new(executor))
}

/// Run the node until Ctrl-C.
pub async fn run(config: NodeConfig) -> NodeResult<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(event = %Event::ShutdownStart, "interrupt received");
        }
        let _ = stop_tx.send(true);
    });
    run_until(config, stop_rx).await
}

/// Run the node until `stop` flips to true (or its sender is dropped).
pub async fn run_until(config: NodeConfig, stop: watch::Receiver<bool>) -> NodeResult<()> {
    config.validate()?;
    info!(
        event = %Event::BootStart,
        role = %config.role,
        shards = config.shards.len(),
        "starting node"
    );

    match config.role {
        NodeRole::Primary => run_primary(config, stop).await,
        NodeRole::Secondary => run_secondary(config, stop).await,
    }
}

async fn run_primary(config: NodeConfig, stop: watch::Receiver<bool>) -> NodeResult<()> {
    let executor = build_executor(&config)?;
    let setup = PrimaryCoordinator::shard_setup_statements(config.shard_names());
    let coordinator = Arc::new(PrimaryCoordinator::new(
        executor,
        config.coordination.clone(),
        setup,
    ));

    let server = PrimaryServer::bind(Arc::clone(&coordinator)).await?;
    let control = spawn_control(
        &config,
        ControlSurface::primary(coordinator),
        stop.clone(),
    );

    let result = server.run_until(stopped(stop)).await;
    finish_control(control).await;
    result.map_err(NodeError::from)
}

async fn run_secondary(config: NodeConfig, stop: watch::Receiver<bool>) -> NodeResult<()> {
    let primary = config
        .coordination
        .primary_endpoint()
        .ok_or_else(|| NodeError::config("secondary requires primary_address to be configured"))?;

    let executor = build_executor(&config)?;
    let mut node =
        SecondaryNode::connect(&primary, Arc::clone(&executor), &config.coordination).await?;
    if config.coordination.full_sync_on_start {
        node.full_sync().await?;
    }

    // the control API goes down with the link
    let (link_down_tx, link_down_rx) = watch::channel(false);
    let control_stop = merge(stop.clone(), link_down_rx);
    let surface = ControlSurface::new(executor, Replicator::Secondary(node.link()));
    let control = spawn_control(&config, surface, control_stop);

    let result = node.run_until(stopped(stop)).await;
    let _ = link_down_tx.send(true);
    finish_control(control).await;
    result.map_err(NodeError::from)
}

fn spawn_control(
    config: &NodeConfig,
    surface: ControlSurface,
    stop: watch::Receiver<bool>,
) -> Option<JoinHandle<std::io::Result<()>>> {
    if !config.control.enabled {
        return None;
    }
    let server = HttpServer::new(config.control.clone(), Arc::new(surface));
    Some(tokio::spawn(server.serve_until(stopped(stop))))
}

async fn finish_control(control: Option<JoinHandle<std::io::Result<()>>>) {
    let Some(handle) = control else {
        return;
    };
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "control API stopped with error"),
        Err(e) => warn!(error = %e, "control API task failed"),
    }
}

/// Resolves once `stop` is set or its sender is gone.
fn stopped(mut stop: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        while !*stop.borrow() {
            if stop.changed().await.is_err() {
                break;
            }
        }
    }
}

/// A receiver that flips when either input does.
fn merge(a: watch::Receiver<bool>, b: watch::Receiver<bool>) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = stopped(a) => {}
            _ = stopped(b) => {}
        }
        let _ = tx.send(true);
    });
    rx
}
