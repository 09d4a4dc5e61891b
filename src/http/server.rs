//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, body limit, timeout, request ID)
//! - Bind server to listener
//! - Apply configuration reloads between requests
//! - Drain backend connections on shutdown

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::State,
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BridgeConfig;
use crate::http::download::download_handler;
use crate::http::upload::upload_handler;
use crate::net::connection::{BackendTarget, ConnectionTracker};

/// How long shutdown waits for in-flight handshakes to release their sockets.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<BridgeConfig>>,
    pub tracker: ConnectionTracker,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Backend target from the current configuration snapshot.
    pub fn backend_target(&self) -> BackendTarget {
        BackendTarget::from_config(&self.config.load())
    }

    pub fn max_download_bytes(&self) -> u64 {
        self.config.load().limits.max_download_bytes
    }

    /// Swap in a reloaded configuration. Backend address, connect/read
    /// timeouts and the download limit apply to the next request; listener,
    /// body limit and request timeout are fixed until restart.
    pub fn apply_config(&self, new_config: BridgeConfig) {
        let current = self.config.load();
        if current.listener != new_config.listener
            || current.limits.max_upload_bytes != new_config.limits.max_upload_bytes
            || current.timeouts.request_secs != new_config.timeouts.request_secs
        {
            tracing::warn!(
                "Listener, upload limit and request timeout changes take effect on restart"
            );
        }
        tracing::info!(
            backend = %new_config.backend.address,
            connect_timeout_secs = new_config.timeouts.connect_secs,
            read_timeout_secs = new_config.timeouts.read_secs,
            "Configuration reloaded"
        );
        self.config.store(Arc::new(new_config));
    }
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: String,
    pub active_backend_connections: u64,
}

/// HTTP front door of the bridge.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BridgeConfig) -> Self {
        let state = AppState::new(config.clone());
        let router = Self::build_router(&config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, state: AppState) -> Router {
        Router::new()
            .route("/upload", post(upload_handler))
            .route("/download/{filename}", get(download_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.limits.max_upload_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Handle to the router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires, applying configs from `config_updates`
    /// as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<BridgeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.state.config.load().backend.address,
            "HTTP server starting"
        );

        let reload_state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                reload_state.apply_config(new_config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();

        if !self.state.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                remaining = self.state.tracker.active_count(),
                "Backend connections still open after drain timeout"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.config.load().backend.address.clone(),
        active_backend_connections: state.tracker.active_count(),
    })
}
