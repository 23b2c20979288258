//! # HTTP Server
//!
//! Serves the control routes with CORS and request tracing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::config::HttpServerConfig;
use super::routes::control_routes;
use crate::control::ControlSurface;
use crate::observability::Event;

/// HTTP control API of one node
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, surface: Arc<ControlSurface>) -> Self {
        let router = Self::build_router(&config, surface);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, surface: Arc<ControlSurface>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        control_routes(surface).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        if let Some(addr) = addr {
            info!(event = %Event::Serving, addr = %addr, "control API listening");
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SqliteBackend, StorageBackend};
    use crate::executor::StatementExecutor;
    use crate::observability::MetricsRegistry;
    use crate::replication::{CoordinationConfig, PrimaryCoordinator};
    use crate::sharding::{AllocationPolicy, ShardRouter};

    fn surface() -> Arc<ControlSurface> {
        let base: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::in_memory("base"));
        let executor = Arc::new(StatementExecutor::new(
            base,
            Vec::new(),
            Arc::new(ShardRouter::new(0, AllocationPolicy::RoundRobin)),
            Arc::new(MetricsRegistry::new()),
        ));
        let coordinator = Arc::new(PrimaryCoordinator::new(
            executor,
            CoordinationConfig::default(),
            Vec::new(),
        ));
        Arc::new(ControlSurface::primary(coordinator))
    }

    #[test]
    fn test_server_with_custom_port() {
        let server = HttpServer::new(HttpServerConfig::with_port(8082), surface());
        assert_eq!(server.socket_addr(), "0.0.0.0:8082");
    }

    #[test]
    fn test_router_builds_with_origin_list() {
        let config = HttpServerConfig {
            cors_origins: vec!["http://localhost:3000".to_string()],
            ..Default::default()
        };
        let _router = HttpServer::new(config, surface()).router();
    }
}
