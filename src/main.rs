//! Upload bridge (v1)
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                UPLOAD BRIDGE                  │
//!   POST /upload         │  ┌────────┐   ┌───────────┐   ┌───────────┐  │
//!   ─────────────────────┼─▶│  http  │──▶│ handshake │──▶│    net    │──┼──▶ Backend
//!                        │  │handler │   │  machine  │   │connection │  │    (TCP)
//!   JSON result          │  └────────┘   └───────────┘   └───────────┘  │
//!   ◀────────────────────┼───────────────────┘  ▲              │        │
//!                        │                      └── protocol ──┘        │
//!                        │                          codec               │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use upload_bridge::config::validation::validate_config;
use upload_bridge::config::{load_config, BridgeConfig, ConfigError};
use upload_bridge::lifecycle::startup;

#[derive(Parser)]
#[command(name = "upload-bridge")]
#[command(about = "Bridge HTTP uploads to a binary TCP file backend", long_about = None)]
struct Args {
    /// TOML configuration file; watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the backend address (host:port).
    #[arg(long)]
    backend: Option<String>,

    /// Override the HTTP bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(backend) = args.backend {
        config.backend.address = backend;
    }
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    startup::run(config, args.config.as_deref()).await
}
