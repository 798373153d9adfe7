//! Application layer for podlink-gateway.
//!
//! Everything that happens between an accepted WebSocket and its Close frame:
//! the command handshake, the two relay directions, the per-session shutdown
//! coordinator, and the two session drivers (`exec` and `logs`) that wire
//! them together.  Upstream pipes come from a [`WorkloadProvider`].
//!
//! Nothing here binds sockets or spawns processes; that is infrastructure.

pub mod exec;
pub mod handshake;
pub mod inbound;
pub mod logs;
pub mod outbound;
pub mod provider;
pub mod session;
pub mod transport;

pub use exec::run_exec_session;
pub use handshake::{receive_command, HandshakeError};
pub use logs::run_log_session;
pub use provider::{BoxReader, BoxWriter, ExecChannel, LogOptions, ProviderError, WorkloadProvider};
pub use session::{Session, WsSink};
