//! All podlink wire frame types.
//!
//! A frame is one binary WebSocket message.  The client sends a single
//! [`Command`] first (interactive sessions only), followed by any number of
//! stdin chunks and resize events.  The server answers with stdout/stderr
//! chunks (interactive) or plain text chunks (log streaming).

use serde::{Deserialize, Serialize};

// ── Tag bytes ─────────────────────────────────────────────────────────────────

/// Tag byte identifying the variant carried by a frame.
///
/// Client-originated tags live in `0x01–0x7F`; server-originated tags in
/// `0x80–0xFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client → server
    Command = 0x01,
    StdinChunk = 0x02,
    ResizeEvent = 0x03,
    // Server → client
    StdoutChunk = 0x81,
    StderrChunk = 0x82,
    TextChunk = 0x83,
}

impl MessageType {
    /// Returns `true` for tags the browser is allowed to send.
    pub fn is_client_originated(self) -> bool {
        (self as u8) < 0x80
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Command),
            0x02 => Ok(MessageType::StdinChunk),
            0x03 => Ok(MessageType::ResizeEvent),
            0x81 => Ok(MessageType::StdoutChunk),
            0x82 => Ok(MessageType::StderrChunk),
            0x83 => Ok(MessageType::TextChunk),
            _ => Err(()),
        }
    }
}

// ── Payload types ─────────────────────────────────────────────────────────────

/// The command to run inside the container, sent once as the first frame of
/// an interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Executable path or name (e.g. `/bin/sh`).
    pub name: String,
    /// Arguments passed to the executable, in order.
    pub args: Vec<String>,
    /// Whether the remote side should allocate a terminal.
    pub tty: bool,
    /// Whether the client will send stdin.
    pub interactive: bool,
}

/// Terminal dimensions carried by a resize event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Columns.
    pub width: u16,
    /// Rows.
    pub height: u16,
}

// ── Unions ────────────────────────────────────────────────────────────────────

/// Every frame a browser may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Initial handshake frame for interactive sessions.
    Command(Command),
    /// Bytes to write to the remote process' stdin.
    StdinChunk(Vec<u8>),
    /// The client terminal was resized.
    ResizeEvent(TerminalSize),
}

impl ClientMessage {
    /// Returns the tag byte for this variant.
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::Command(_) => MessageType::Command,
            ClientMessage::StdinChunk(_) => MessageType::StdinChunk,
            ClientMessage::ResizeEvent(_) => MessageType::ResizeEvent,
        }
    }
}

/// Every frame the gateway may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Bytes read from the remote process' stdout.
    StdoutChunk(Vec<u8>),
    /// Bytes read from the remote process' stderr.
    StderrChunk(Vec<u8>),
    /// Bytes read from a container log stream.
    TextChunk(Vec<u8>),
}

impl ServerMessage {
    /// Returns the tag byte for this variant.
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::StdoutChunk(_) => MessageType::StdoutChunk,
            ServerMessage::StderrChunk(_) => MessageType::StderrChunk,
            ServerMessage::TextChunk(_) => MessageType::TextChunk,
        }
    }

    /// Borrows the raw bytes carried by any variant.
    pub fn payload(&self) -> &[u8] {
        match self {
            ServerMessage::StdoutChunk(b)
            | ServerMessage::StderrChunk(b)
            | ServerMessage::TextChunk(b) => b,
        }
    }
}
