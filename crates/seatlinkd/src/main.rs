//! seatlinkd - The seatlink background service
//!
//! Parses arguments, loads configuration, initializes logging and runs the
//! [`Service`] until SIGTERM, SIGINT or SIGHUP.

use anyhow::{Context, Result};
use clap::Parser;
use seatlink_config::load_config_or_default;
use seatlink_util::default_config_path;
use seatlinkd::Service;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// seatlinkd - framed IPC service over bounded per-peer connections
#[derive(Parser, Debug)]
#[command(name = "seatlinkd")]
#[command(about = "Framed IPC service over bounded per-peer connections", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/seatlink/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set SEATLINK_SOCKET env var)
    #[arg(short, long, env = "SEATLINK_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "seatlinkd starting");

    let mut config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?
        .daemon;
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    info!(
        config_path = %args.config.display(),
        buffer_size = config.buffer_size,
        max_clients = config.max_clients,
        "Configuration loaded"
    );

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sighup.recv() => info!("Received SIGHUP"),
        }
    };

    let service = Service::new(config).await?;
    service.run(shutdown).await
}
