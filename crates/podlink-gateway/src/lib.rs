//! podlink-gateway library crate.
//!
//! A WebSocket gateway that gives a browser an interactive shell inside a
//! running container, or a live tail of its log, over one connection.
//!
//! # Architecture
//!
//! ```text
//! Browser (binary frames over WebSocket)
//!         ↕
//! [podlink-gateway]
//!   ├── domain/           GatewayConfig, upgrade parameters, close reasons
//!   ├── application/      Session drivers, relays, shutdown coordinator
//!   └── infrastructure/
//!         ├── ws_server/       Accept loop and upgrade routing
//!         ├── local_provider/  Child processes and log files
//!         └── config_file/     Optional TOML configuration
//!         ↕
//! Workload (exec channel pipes, log stream)
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain` and `podlink-core`, and reaches the
//!   outside world only through the [`application::WorkloadProvider`] port
//!   and the WebSocket halves it is handed.
//! - `infrastructure` binds sockets, spawns processes and reads files.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: session lifecycle and relaying.
pub mod application;

/// Infrastructure layer: WebSocket server, local provider, config file.
pub mod infrastructure;
