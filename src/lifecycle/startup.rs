//! Startup orchestration.
//!
//! # Order
//! 1. Logging (from the already validated config)
//! 2. Metrics exporter, if enabled
//! 3. Config file watcher, if a file was given
//! 4. HTTP listener, last, so traffic only arrives when everything is ready
//!
//! Any startup error is fatal.

use std::net::SocketAddr;
use std::path::Path;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::BridgeConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};

/// Run the bridge until a shutdown signal arrives.
pub async fn run(
    config: BridgeConfig,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability);

    tracing::info!("upload-bridge v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        connect_timeout_secs = config.timeouts.connect_secs,
        read_timeout_secs = config.timeouts.read_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    // The watcher must outlive the server.
    let (config_updates, _watcher) = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    HttpServer::new(config)
        .run(listener, config_updates, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
