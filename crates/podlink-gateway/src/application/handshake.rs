//! Initial command handshake of an exec session.

use futures_util::{Stream, StreamExt};
use podlink_core::{decode_client_message, ClientMessage, Command, ProtocolError};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::trace;

/// The first binary frame was not a usable `Command`.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid command frame: {0}")]
    Decode(#[from] ProtocolError),

    #[error("expected a command frame, got {0:?}")]
    UnexpectedFrame(podlink_core::protocol::messages::MessageType),

    #[error("connection failed before the command frame: {0}")]
    Transport(#[from] WsError),

    #[error("connection closed before the command frame")]
    Closed,
}

/// Reads messages until the first binary one and decodes it as a [`Command`].
///
/// Text, Ping and Pong messages before the command are skipped.  Any failure
/// here is fatal: the session is never created and no upstream pipes are
/// opened.
///
/// # Errors
///
/// See [`HandshakeError`].
pub async fn receive_command<S>(stream: &mut S) -> Result<Command, HandshakeError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let msg = match stream.next().await {
            Some(msg) => msg?,
            None => return Err(HandshakeError::Closed),
        };
        match msg {
            Message::Binary(bytes) => {
                return match decode_client_message(&bytes)? {
                    ClientMessage::Command(command) => Ok(command),
                    other => Err(HandshakeError::UnexpectedFrame(other.message_type())),
                };
            }
            Message::Close(_) => return Err(HandshakeError::Closed),
            other => trace!("skipping {} byte non-binary message before command", other.len()),
        }
    }
}
