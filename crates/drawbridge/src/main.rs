//! # drawbridge
//!
//! Server binary: loads settings, starts the bridge and its HTTP surface, and
//! runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drawbridge_core::logging::{init_subscriber, LogFormat};
use drawbridge_server::{BridgeServer, ServerConfig};
use drawbridge_settings::{settings_path, BridgeSettings};

/// Time background tasks get to stop after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Relay between automation agents and a browser-hosted diagram editor.
#[derive(Parser, Debug)]
#[command(name = "drawbridge", version, about)]
struct Cli {
    /// Settings file (default `~/.drawbridge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Per-request reply timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level or filter directive (e.g. `debug`, `drawbridge_bus=trace`).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Command-line flags win over file and environment values.
    fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ms) = self.timeout_ms {
            settings.bus.request_timeout_ms = ms;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = drawbridge_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid command-line override")?;

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let metrics = drawbridge_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let server = BridgeServer::new(ServerConfig::from_settings(&settings)).with_metrics(metrics);
    let addr = server
        .listen()
        .await
        .with_context(|| format!("failed to bind {}:{}", settings.server.host, settings.server.port))?;
    tracing::info!(
        %addr,
        request_timeout_ms = settings.bus.request_timeout_ms,
        "editor transports: ws://{addr}/ws, http://{addr}/events; agents: http://{addr}/rpc"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    server.shutdown().graceful_shutdown(Some(SHUTDOWN_GRACE)).await;
    Ok(())
}
