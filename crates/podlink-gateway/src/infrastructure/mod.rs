//! Infrastructure layer for podlink-gateway.
//!
//! Everything that touches the operating system: the TCP listener and
//! WebSocket upgrade, the local process/log-file provider, and the optional
//! TOML configuration file.
//!
//! # What does NOT belong here?
//!
//! - Relay logic and session teardown (application layer)
//! - Parameter parsing and close-reason vocabulary (domain layer)

pub mod config_file;
pub mod local_provider;
pub mod ws_server;

pub use config_file::{load_config, ConfigError, FileConfig};
pub use local_provider::LocalProcessProvider;
pub use ws_server::{run_server, serve};
