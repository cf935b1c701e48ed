//! Framecast Daemon
//!
//! Standalone server process that streams looping text animations to
//! terminal clients over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (port 3000, frames under ./frames)
//! framecast-daemon
//!
//! # Custom port and frame root
//! framecast-daemon --port 8080 --frames-dir /srv/frames
//!
//! # With verbose logging
//! RUST_LOG=debug framecast-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `FRAMECAST_PORT`: listen port (default: 3000)
//! - `FRAMECAST_FRAMES_DIR`: frame root directory (default: `./frames`)
//! - `FRAMECAST_DEFAULT_SET`: frame set served at `/` (default: `parrot`)
//! - `FRAMECAST_REDIRECT_URL`: where non-terminal clients are sent
//! - `FRAMECAST_TICK_MS`: emission period in milliseconds (default: 70)
//! - `FRAMECAST_CONFIG`: explicit configuration file path
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! # Files
//!
//! - Config: `$XDG_CONFIG_HOME/framecast/framecast.toml` (optional)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: graceful shutdown (stops accepting, drops live
//!   streams)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use framecast_core::{load_config, ConfigOverrides, FrameStore};

mod server;

use server::{router, AppState};

/// Animated text streaming over HTTP.
#[derive(Debug, Parser)]
#[command(name = "framecast-daemon", version)]
struct Cli {
    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Frame root directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Frame set served at /
    #[arg(long)]
    default_set: Option<String>,

    /// Explicit configuration file path
    #[arg(long, env = "FRAMECAST_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// The CLI layer of the configuration stack.
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            frames_dir: self.frames_dir.clone(),
            default_set: self.default_set.clone(),
            ..ConfigOverrides::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("framecast_daemon=info".parse()?)
                .add_directive("framecast_core=info".parse()?),
        )
        .with_target(true)
        .init();

    info!("Starting framecast daemon");
    info!("PID: {}", std::process::id());

    let config = load_config(cli.config.as_deref(), &cli.overrides())
        .context("failed to load configuration")?;
    info!(
        port = config.port,
        frames_dir = %config.frames_dir.display(),
        default_set = %config.default_set,
        tick_ms = config.tick_interval.as_millis() as u64,
        "configuration resolved"
    );

    let store = Arc::new(FrameStore::new(&config.frames_dir));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(store, Arc::new(config));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening for connections");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
