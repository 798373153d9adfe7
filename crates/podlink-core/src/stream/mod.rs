//! Streaming primitives shared by every relay session.
//!
//! All of these are owned by exactly one session; none is shared across
//! connections.

pub mod pump;
pub mod size_queue;
pub mod timeout_reader;
pub mod watchdog;

pub use pump::{spawn_pump, Chunk, Framing, PumpExit, PumpHandle, StreamKind, TimeoutPolicy};
pub use size_queue::{QueueClosed, SizeReceiver, SizeSender, TerminalSizeQueue};
pub use timeout_reader::{ReadError, ReaderCloser, TimeoutReader};
pub use watchdog::Watchdog;
