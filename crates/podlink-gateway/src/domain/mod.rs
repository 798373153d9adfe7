//! Domain layer for podlink-gateway.
//!
//! Pure types with no I/O: gateway configuration, the parameters a browser
//! puts on the upgrade request, and the vocabulary for why a session ended.

pub mod close;
pub mod config;
pub mod params;

pub use close::{CloseReason, ErrorPayload};
pub use config::{GatewayConfig, InvalidConfig};
pub use params::{ExecParams, LogParams, ParamError, SessionRequest, WorkloadTarget};
