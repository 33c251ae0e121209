//! `BridgeServer`: Axum HTTP, WebSocket and SSE server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use drawbridge_bus::Bridge;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::ingress::reply_handler;
use crate::rpc::handlers::register_all;
use crate::rpc::{MethodRegistry, RpcContext, RpcResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::sse::sse_handler;
use crate::websocket::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The running bridge.
    pub bridge: Arc<Bridge>,
    /// RPC method registry.
    pub registry: Arc<MethodRegistry>,
    /// Handler context.
    pub rpc: RpcContext,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// WebSocket ping and SSE keep-alive interval.
    pub heartbeat_interval: Duration,
    /// Inbound message size limit.
    pub max_message_size: usize,
    /// Prometheus handle, absent when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The bridge server.
pub struct BridgeServer {
    config: ServerConfig,
    bridge: Arc<Bridge>,
    registry: Arc<MethodRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl BridgeServer {
    /// Server with a fresh bridge and every editor command registered.
    pub fn new(config: ServerConfig) -> Self {
        let bridge = Arc::new(Bridge::new(&config.bus));
        Self::with_bridge(config, bridge)
    }

    /// Server around an existing bridge.
    pub fn with_bridge(config: ServerConfig, bridge: Arc<Bridge>) -> Self {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        Self {
            config,
            bridge,
            registry: Arc::new(registry),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: Arc::clone(&self.bridge),
            registry: Arc::clone(&self.registry),
            rpc: RpcContext {
                bridge: Arc::clone(&self.bridge),
                start_time: self.start_time,
            },
            shutdown: self.shutdown.token(),
            start_time: self.start_time,
            heartbeat_interval: self.config.heartbeat_interval,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/rpc", post(rpc_handler))
            .route("/reply", post(reply_handler))
            .route("/ws", get(ws_handler))
            .route("/events", get(sse_handler))
            .layer(DefaultBodyLimit::max(self.config.max_message_size))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind, start the bridge tasks, and serve until shutdown.
    ///
    /// Every spawned task is tracked by the shutdown coordinator, so
    /// [`ShutdownCoordinator::graceful_shutdown`] waits for the listener to
    /// close. Returns the bound address.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let token = self.shutdown.token();

        self.shutdown.track(self.bridge.spawn(&token));

        let app = self.router();
        let serve = tokio::spawn(async move {
            let signal = async move { token.cancelled().await };
            if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
                error!(error = %err, "server error");
            }
        });

        self.shutdown.track([serve]);

        info!(%addr, "drawbridge listening");
        Ok(addr)
    }

    /// The bridge.
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.bridge.registry().len(),
        state.bridge.bus().stats(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    Json(state.registry.dispatch_raw(&body, &state.rpc).await)
}
