//! Binary codec for encoding and decoding podlink frames.
//!
//! Wire format (one WebSocket binary message per frame):
//! ```text
//! [tag:1][payload:N]
//! ```
//! All multi-byte integers are big-endian.  Payloads:
//!
//! | Tag  | Variant       | Payload                                                          |
//! |------|---------------|------------------------------------------------------------------|
//! | 0x01 | `Command`     | `[tty:1][interactive:1][name_len:2][name][argc:2]([len:2][arg])*` |
//! | 0x02 | `StdinChunk`  | raw bytes                                                        |
//! | 0x03 | `ResizeEvent` | `[width:2][height:2]`                                            |
//! | 0x81 | `StdoutChunk` | raw bytes                                                        |
//! | 0x82 | `StderrChunk` | raw bytes                                                        |
//! | 0x83 | `TextChunk`   | raw bytes                                                        |
//!
//! Decoding never yields a partially filled variant: any structural problem is
//! reported as a [`ProtocolError`].

use thiserror::Error;

use crate::protocol::messages::{ClientMessage, Command, MessageType, ServerMessage, TerminalSize};

/// Size of the tag prefix in bytes.
pub const TAG_SIZE: usize = 1;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The message was empty; not even a tag byte was present.
    #[error("empty frame")]
    EmptyFrame,

    /// The tag byte is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The tag is valid but belongs to the other direction of the connection.
    #[error("unexpected message type {0:?} for this direction")]
    WrongDirection(MessageType),

    /// The payload could not be parsed (length out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A field is too large to be represented on the wire.
    #[error("field too large: {0}")]
    FieldTooLarge(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ClientMessage`] into a single frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLarge`] if the command name, an argument,
/// or the argument count does not fit its 16-bit length prefix.
///
/// # Examples
///
/// ```rust
/// use podlink_core::protocol::{decode_client_message, encode_client_message};
/// use podlink_core::protocol::messages::{ClientMessage, TerminalSize};
///
/// let msg = ClientMessage::ResizeEvent(TerminalSize { width: 80, height: 24 });
/// let bytes = encode_client_message(&msg).unwrap();
/// assert_eq!(decode_client_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(TAG_SIZE + encoded_len_hint(msg));
    buf.push(msg.message_type() as u8);
    match msg {
        ClientMessage::Command(c) => encode_command(&mut buf, c)?,
        ClientMessage::StdinChunk(data) => buf.extend_from_slice(data),
        ClientMessage::ResizeEvent(size) => {
            buf.extend_from_slice(&size.width.to_be_bytes());
            buf.extend_from_slice(&size.height.to_be_bytes());
        }
    }
    Ok(buf)
}

/// Encodes a [`ServerMessage`] into a single frame.
///
/// Server frames carry raw bytes only, so encoding cannot fail.
pub fn encode_server_message(msg: &ServerMessage) -> Vec<u8> {
    let payload = msg.payload();
    let mut buf = Vec::with_capacity(TAG_SIZE + payload.len());
    buf.push(msg.message_type() as u8);
    buf.extend_from_slice(payload);
    buf
}

/// Decodes one [`ClientMessage`] from a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is empty, carries an unknown or
/// server-only tag, or has a malformed payload.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let (msg_type, payload) = split_tag(bytes)?;
    match msg_type {
        MessageType::Command => decode_command(payload).map(ClientMessage::Command),
        MessageType::StdinChunk => Ok(ClientMessage::StdinChunk(payload.to_vec())),
        MessageType::ResizeEvent => decode_resize(payload).map(ClientMessage::ResizeEvent),
        other => Err(ProtocolError::WrongDirection(other)),
    }
}

/// Decodes one [`ServerMessage`] from a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is empty or carries an unknown or
/// client-only tag.
pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let (msg_type, payload) = split_tag(bytes)?;
    let data = payload.to_vec();
    match msg_type {
        MessageType::StdoutChunk => Ok(ServerMessage::StdoutChunk(data)),
        MessageType::StderrChunk => Ok(ServerMessage::StderrChunk(data)),
        MessageType::TextChunk => Ok(ServerMessage::TextChunk(data)),
        other => Err(ProtocolError::WrongDirection(other)),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn split_tag(bytes: &[u8]) -> Result<(MessageType, &[u8]), ProtocolError> {
    let (&tag, payload) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let msg_type = MessageType::try_from(tag).map_err(|_| ProtocolError::UnknownMessageType(tag))?;
    Ok((msg_type, payload))
}

fn encoded_len_hint(msg: &ClientMessage) -> usize {
    match msg {
        ClientMessage::Command(c) => {
            6 + c.name.len() + c.args.iter().map(|a| 2 + a.len()).sum::<usize>()
        }
        ClientMessage::StdinChunk(data) => data.len(),
        ClientMessage::ResizeEvent(_) => 4,
    }
}

fn encode_command(buf: &mut Vec<u8>, c: &Command) -> Result<(), ProtocolError> {
    buf.push(u8::from(c.tty));
    buf.push(u8::from(c.interactive));
    write_length_prefixed_string(buf, &c.name, "Command.name")?;
    let argc = u16::try_from(c.args.len())
        .map_err(|_| ProtocolError::FieldTooLarge(format!("{} arguments", c.args.len())))?;
    buf.extend_from_slice(&argc.to_be_bytes());
    for arg in &c.args {
        write_length_prefixed_string(buf, arg, "Command.args")?;
    }
    Ok(())
}

fn decode_command(p: &[u8]) -> Result<Command, ProtocolError> {
    // 1 (tty) + 1 (interactive) + 2 (name_len) + name + 2 (argc)
    require_len(p, 6, "Command")?;
    let tty = read_bool(p[0], "Command.tty")?;
    let interactive = read_bool(p[1], "Command.interactive")?;
    let (name, mut offset) = read_length_prefixed_string(p, 2)?;
    require_len(p, offset + 2, "Command.argc")?;
    let argc = u16::from_be_bytes([p[offset], p[offset + 1]]) as usize;
    offset += 2;

    let mut args = Vec::with_capacity(argc.min(64));
    for _ in 0..argc {
        let (arg, next) = read_length_prefixed_string(p, offset)?;
        args.push(arg);
        offset = next;
    }

    if offset != p.len() {
        return Err(ProtocolError::MalformedPayload(format!(
            "Command: {} trailing bytes",
            p.len() - offset
        )));
    }

    Ok(Command {
        name,
        args,
        tty,
        interactive,
    })
}

fn decode_resize(p: &[u8]) -> Result<TerminalSize, ProtocolError> {
    if p.len() != 4 {
        return Err(ProtocolError::MalformedPayload(format!(
            "ResizeEvent: need exactly 4 bytes, got {}",
            p.len()
        )));
    }
    Ok(TerminalSize {
        width: u16::from_be_bytes([p[0], p[1]]),
        height: u16::from_be_bytes([p[2], p[3]]),
    })
}

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_bool(byte: u8, context: &str) -> Result<bool, ProtocolError> {
    match byte {
        0x00 => Ok(false),
        0x01 => Ok(true),
        other => Err(ProtocolError::MalformedPayload(format!(
            "{context}: invalid boolean byte 0x{other:02X}"
        ))),
    }
}

/// Writes a 2-byte length prefix followed by the UTF-8 bytes of `s`.
fn write_length_prefixed_string(
    buf: &mut Vec<u8>,
    s: &str,
    context: &str,
) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len())
        .map_err(|_| ProtocolError::FieldTooLarge(format!("{context}: {} bytes", s.len())))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?;
    Ok((s.to_string(), start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
