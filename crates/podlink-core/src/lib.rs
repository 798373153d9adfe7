//! # podlink-core
//!
//! Shared library for podlink containing the browser-facing wire protocol and
//! the streaming primitives every relay session is assembled from.
//!
//! # Architecture overview
//!
//! podlink exposes interactive command execution and log tailing inside
//! running workload containers to a browser over one long-lived WebSocket
//! connection.  This crate holds the pieces that do not care about sockets:
//!
//! - **`protocol`** – How frames travel over the connection.  Each frame is one
//!   binary WebSocket message: a tag byte followed by a payload.  The client
//!   and server unions are closed Rust enums ([`ClientMessage`] and
//!   [`ServerMessage`]).
//!
//! - **`stream`** – The concurrency building blocks of a session:
//!   a [`TimeoutReader`] that puts a deadline on every upstream read, a
//!   kickable one-shot [`Watchdog`], the bounded [`TerminalSizeQueue`] carrying
//!   resize events, and the upstream [`pump`](stream::pump) that hands chunks
//!   to the connection writer one at a time.

pub mod protocol;
pub mod stream;

// Re-export the most-used types at the crate root so callers can write
// `podlink_core::ClientMessage` instead of the full module path.
pub use protocol::codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ProtocolError,
};
pub use protocol::messages::{ClientMessage, Command, ServerMessage, TerminalSize};
pub use stream::pump::{spawn_pump, Chunk, Framing, PumpExit, PumpHandle, StreamKind, TimeoutPolicy};
pub use stream::size_queue::{QueueClosed, SizeReceiver, SizeSender, TerminalSizeQueue};
pub use stream::timeout_reader::{ReadError, ReaderCloser, TimeoutReader};
pub use stream::watchdog::Watchdog;
