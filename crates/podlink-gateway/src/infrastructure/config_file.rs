//! Optional TOML configuration file.
//!
//! Every key is optional; a missing key takes the built-in default.  Values
//! given on the command line (or through `PODLINK_*` variables) override the
//! file.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8470"
//!
//! [session]
//! ping_interval_secs = 10
//! pong_timeout_secs = 30
//! close_grace_ms = 2000
//! chunk_size = 32768
//! size_queue_capacity = 20
//!
//! [logs]
//! dir = "/var/log/containers"
//! read_timeout_secs = 5
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::GatewayConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not a socket address.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// On-disk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logs: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Keepalive and relay tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
    #[serde(default = "default_close_grace")]
    pub close_grace_ms: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_size_queue_capacity")]
    pub size_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSection {
    /// Directory the local provider reads `<container>.log` from.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    GatewayConfig::default().bind_addr.to_string()
}
fn default_ping_interval() -> u64 {
    GatewayConfig::default().ping_interval.as_secs()
}
fn default_pong_timeout() -> u64 {
    GatewayConfig::default().pong_timeout.as_secs()
}
fn default_close_grace() -> u64 {
    GatewayConfig::default().close_grace.as_millis() as u64
}
fn default_chunk_size() -> usize {
    GatewayConfig::default().chunk_size
}
fn default_size_queue_capacity() -> usize {
    GatewayConfig::default().size_queue_capacity
}
fn default_log_dir() -> PathBuf {
    GatewayConfig::default().log_dir
}
fn default_read_timeout() -> u64 {
    GatewayConfig::default().log_read_timeout.as_secs()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            close_grace_ms: default_close_grace(),
            chunk_size: default_chunk_size(),
            size_queue_capacity: default_size_queue_capacity(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl FileConfig {
    /// Converts the file contents into a [`GatewayConfig`].  Validation is
    /// left to the caller, after command-line overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` does not
    /// parse.
    pub fn into_gateway_config(self) -> Result<GatewayConfig, ConfigError> {
        let bind_addr: SocketAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.server.bind_address.clone()))?;

        Ok(GatewayConfig {
            bind_addr,
            ping_interval: Duration::from_secs(self.session.ping_interval_secs),
            pong_timeout: Duration::from_secs(self.session.pong_timeout_secs),
            log_read_timeout: Duration::from_secs(self.logs.read_timeout_secs),
            close_grace: Duration::from_millis(self.session.close_grace_ms),
            chunk_size: self.session.chunk_size,
            size_queue_capacity: self.session.size_queue_capacity,
            log_dir: self.logs.dir,
        })
    }
}

/// Parses TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the configuration file at `path`.  The file must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}
