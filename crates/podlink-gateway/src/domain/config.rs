//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from defaults, an optional TOML file and CLI/env
//! overrides, then calls [`GatewayConfig::validate`] before serving.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default upstream read size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Largest accepted upstream read size.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// A configuration value that cannot work at runtime.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("pong timeout ({pong_timeout:?}) must be longer than the ping interval ({ping_interval:?})")]
    PongTimeoutTooShort {
        ping_interval: Duration,
        pong_timeout: Duration,
    },

    #[error("chunk size {0} exceeds the maximum of {MAX_CHUNK_SIZE} bytes")]
    ChunkTooLarge(usize),
}

/// All runtime configuration for the gateway.
///
/// # Example
///
/// ```rust
/// use podlink_gateway::domain::GatewayConfig;
///
/// let cfg = GatewayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8470);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// How often a WebSocket Ping is sent to the browser.
    pub ping_interval: Duration,

    /// Watchdog timeout: the session is torn down if no Pong arrives for this
    /// long.  Must exceed `ping_interval`.
    pub pong_timeout: Duration,

    /// Per-read deadline on log streams.  For a non-follow stream a timeout
    /// means the log is exhausted; in follow mode it only means "quiet".
    pub log_read_timeout: Duration,

    /// Upper bound on writing the Close frame during teardown.
    pub close_grace: Duration,

    /// Maximum bytes read from an upstream pipe per frame.
    pub chunk_size: usize,

    /// Number of resize events that can wait for the execution channel.
    pub size_queue_capacity: usize,

    /// Directory holding `<container>.log` files for the local provider.
    pub log_dir: PathBuf,
}

impl Default for GatewayConfig {
    /// | Field               | Default          |
    /// |---------------------|------------------|
    /// | bind_addr           | `0.0.0.0:8470`   |
    /// | ping_interval       | 10 seconds       |
    /// | pong_timeout        | 30 seconds       |
    /// | log_read_timeout    | 5 seconds        |
    /// | close_grace         | 2 seconds        |
    /// | chunk_size          | 32 KiB           |
    /// | size_queue_capacity | 20               |
    /// | log_dir             | `./logs`         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8470)),
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
            log_read_timeout: Duration::from_secs(5),
            close_grace: Duration::from_secs(2),
            chunk_size: DEFAULT_CHUNK_SIZE,
            size_queue_capacity: podlink_core::stream::size_queue::DEFAULT_CAPACITY,
            log_dir: PathBuf::from("./logs"),
        }
    }
}

impl GatewayConfig {
    /// Rejects settings that would make sessions misbehave.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let durations = [
            ("ping interval", self.ping_interval),
            ("pong timeout", self.pong_timeout),
            ("log read timeout", self.log_read_timeout),
            ("close grace", self.close_grace),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(InvalidConfig::Zero(name));
            }
        }
        if self.pong_timeout <= self.ping_interval {
            return Err(InvalidConfig::PongTimeoutTooShort {
                ping_interval: self.ping_interval,
                pong_timeout: self.pong_timeout,
            });
        }
        if self.chunk_size == 0 {
            return Err(InvalidConfig::Zero("chunk size"));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(InvalidConfig::ChunkTooLarge(self.chunk_size));
        }
        if self.size_queue_capacity == 0 {
            return Err(InvalidConfig::Zero("size queue capacity"));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(GatewayConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_default_timings() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.ping_interval, Duration::from_secs(10));
        assert_eq!(cfg.pong_timeout, Duration::from_secs(30));
        assert_eq!(cfg.log_read_timeout, Duration::from_secs(5));
        assert_eq!(cfg.close_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_default_queue_capacity_is_20() {
        assert_eq!(GatewayConfig::default().size_queue_capacity, 20);
    }

    #[test]
    fn test_pong_timeout_must_exceed_ping_interval() {
        // Arrange
        let cfg = GatewayConfig {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(10),
            ..GatewayConfig::default()
        };

        // Act
        let result = cfg.validate();

        // Assert
        assert!(matches!(
            result,
            Err(InvalidConfig::PongTimeoutTooShort { .. })
        ));
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        let cfg = GatewayConfig {
            close_grace: Duration::ZERO,
            ..GatewayConfig::default()
        };
        assert_eq!(cfg.validate(), Err(InvalidConfig::Zero("close grace")));
    }

    #[test]
    fn test_chunk_size_bounds() {
        let zero = GatewayConfig {
            chunk_size: 0,
            ..GatewayConfig::default()
        };
        let huge = GatewayConfig {
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..GatewayConfig::default()
        };

        assert_eq!(zero.validate(), Err(InvalidConfig::Zero("chunk size")));
        assert_eq!(
            huge.validate(),
            Err(InvalidConfig::ChunkTooLarge(MAX_CHUNK_SIZE + 1))
        );
    }
}
