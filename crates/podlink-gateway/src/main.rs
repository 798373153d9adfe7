//! podlink gateway entry point.
//!
//! Accepts browser WebSocket connections on `/exec` and `/logs` and relays
//! them to commands and logs of running containers.
//!
//! # Usage
//!
//! ```text
//! podlink-gateway [OPTIONS]
//!
//! Options:
//!   --config <FILE>              TOML configuration file
//!   --bind <ADDR>                Listener address [default: 0.0.0.0:8470]
//!   --ping-interval <SECS>       Keepalive ping interval [default: 10]
//!   --pong-timeout <SECS>        Watchdog timeout [default: 30]
//!   --log-read-timeout <SECS>    Per-read deadline on log streams [default: 5]
//!   --close-grace-ms <MS>        Bound on writing the Close frame [default: 2000]
//!   --chunk-size <BYTES>         Upstream read size [default: 32768]
//!   --size-queue-capacity <N>    Pending resize events [default: 20]
//!   --log-dir <DIR>              Container log directory [default: ./logs]
//! ```
//!
//! Every option can also be set through the `PODLINK_*` variable of the same
//! name (e.g. `PODLINK_PING_INTERVAL`).  Precedence: command line and
//! environment, then the config file, then the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podlink_gateway::application::WorkloadProvider;
use podlink_gateway::domain::GatewayConfig;
use podlink_gateway::infrastructure::{load_config, run_server, LocalProcessProvider};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Streaming exec and log relay gateway.
///
/// Fields are optional so that an absent flag falls through to the config
/// file instead of overriding it with a default.
#[derive(Debug, Parser)]
#[command(
    name = "podlink-gateway",
    about = "WebSocket gateway for container exec sessions and log streams",
    version
)]
struct Cli {
    /// Path of a TOML configuration file.
    #[arg(long, env = "PODLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address the WebSocket listener binds to.
    #[arg(long, env = "PODLINK_BIND")]
    bind: Option<SocketAddr>,

    /// Seconds between keepalive pings.
    #[arg(long, env = "PODLINK_PING_INTERVAL")]
    ping_interval: Option<u64>,

    /// Seconds without a pong before a session is torn down.
    #[arg(long, env = "PODLINK_PONG_TIMEOUT")]
    pong_timeout: Option<u64>,

    /// Per-read deadline on log streams, in seconds.
    #[arg(long, env = "PODLINK_LOG_READ_TIMEOUT")]
    log_read_timeout: Option<u64>,

    /// Upper bound on writing the Close frame, in milliseconds.
    #[arg(long, env = "PODLINK_CLOSE_GRACE_MS")]
    close_grace_ms: Option<u64>,

    /// Maximum bytes per upstream read.
    #[arg(long, env = "PODLINK_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Resize events that may wait for the execution channel.
    #[arg(long, env = "PODLINK_SIZE_QUEUE_CAPACITY")]
    size_queue_capacity: Option<usize>,

    /// Directory holding `<container>.log` files.
    #[arg(long, env = "PODLINK_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    /// Layers the command line over the config file (if any) over defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the merged
    /// configuration fails validation.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("cannot load {}", path.display()))?
                .into_gateway_config()
                .with_context(|| format!("invalid settings in {}", path.display()))?,
            None => GatewayConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(secs) = self.ping_interval {
            config.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.pong_timeout {
            config.pong_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.log_read_timeout {
            config.log_read_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.close_grace_ms {
            config.close_grace = Duration::from_millis(ms);
        }
        if let Some(bytes) = self.chunk_size {
            config.chunk_size = bytes;
        }
        if let Some(n) = self.size_queue_capacity {
            config.size_queue_capacity = n;
        }
        if let Some(dir) = self.log_dir {
            config.log_dir = dir;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity; `info` when unset or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_gateway_config()?;

    info!(
        "podlink gateway starting: bind={}, ping={:?}, pong timeout={:?}, log dir={}",
        config.bind_addr,
        config.ping_interval,
        config.pong_timeout,
        config.log_dir.display()
    );

    let provider: Arc<dyn WorkloadProvider> =
        Arc::new(LocalProcessProvider::new(config.log_dir.clone()));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, no longer accepting sessions");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, provider, running).await?;

    info!("podlink gateway stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
