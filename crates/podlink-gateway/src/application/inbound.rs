//! Browser-to-upstream direction of a session.
//!
//! [`run_inbound`] serves exec sessions: stdin chunks go to the remote
//! process, resize events go to the terminal size queue.  [`run_drain`] serves
//! log sessions, where the browser has nothing to say; it only keeps reading so
//! that Pongs reach the watchdog and a disconnect is noticed.
//!
//! Both loops end when the session closes, whoever closed it.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use podlink_core::{decode_client_message, ClientMessage, SizeSender};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::application::session::{Session, WsSink};
use crate::application::transport::{classify, ErrorClass};
use crate::domain::CloseReason;

/// Relays stdin and resize frames until the session closes.
///
/// `sizes` is `Some` only for terminal sessions; stdin chunks are dropped
/// unless `interactive` is set.
pub async fn run_inbound<St, S>(
    mut stream: St,
    session: Arc<Session<S>>,
    sizes: Option<SizeSender>,
    interactive: bool,
) where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    S: WsSink,
{
    let id = session.id();

    while let Some(msg) = next_message(&mut stream, &session).await {
        let bytes = match msg {
            Message::Binary(bytes) => bytes,
            Message::Pong(_) => {
                session.kick_watchdog();
                continue;
            }
            _ => continue,
        };

        match decode_client_message(&bytes) {
            Ok(ClientMessage::StdinChunk(data)) => {
                if !interactive {
                    trace!("session {id}: ignoring stdin on non-interactive session");
                    continue;
                }
                if let Err(e) = session.write_stdin(&data).await {
                    if !session.is_closed() {
                        session
                            .close_all(CloseReason::Upstream(format!("stdin write failed: {e}")))
                            .await;
                    }
                    return;
                }
            }
            Ok(ClientMessage::ResizeEvent(size)) => {
                let Some(queue) = &sizes else {
                    trace!("session {id}: ignoring resize on session without tty");
                    continue;
                };
                // A full queue blocks here until the execution channel
                // catches up.
                tokio::select! {
                    result = queue.put(size) => {
                        if result.is_err() {
                            debug!("session {id}: resize queue closed, dropping {}x{}", size.width, size.height);
                        }
                    }
                    () = session.closed() => return,
                }
            }
            Ok(ClientMessage::Command(_)) => {
                debug!("session {id}: ignoring repeated command frame");
            }
            Err(e) => {
                warn!("session {id}: dropping malformed frame: {e}");
            }
        }
    }
}

/// Reads and discards browser messages until the session closes.
pub async fn run_drain<St, S>(mut stream: St, session: Arc<Session<S>>)
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    S: WsSink,
{
    while let Some(msg) = next_message(&mut stream, &session).await {
        if let Message::Pong(_) = msg {
            session.kick_watchdog();
        }
    }
}

/// Next message worth handling.  Returns `None` once the session is closed,
/// closing it first if the browser went away or the transport failed.
async fn next_message<St, S>(stream: &mut St, session: &Session<S>) -> Option<Message>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    S: WsSink,
{
    let id = session.id();
    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            () = session.closed() => return None,
        };

        let reason = match next {
            Some(Ok(Message::Close(frame))) => {
                debug!("session {id}: browser sent close {frame:?}");
                CloseReason::PeerClosed
            }
            Some(Ok(msg)) => return Some(msg),
            None => {
                debug!("session {id}: browser stream ended");
                CloseReason::PeerClosed
            }
            Some(Err(e)) => match classify(&e) {
                ErrorClass::Transient => {
                    trace!("session {id}: transient read error: {e}");
                    continue;
                }
                ErrorClass::Fatal => {
                    debug!("session {id}: connection lost: {e}");
                    CloseReason::Transport(e.to_string())
                }
                ErrorClass::Unclassified => {
                    warn!("session {id}: unexpected read error: {e}");
                    CloseReason::Transport(e.to_string())
                }
            },
        };
        session.close_all(reason).await;
        return None;
    }
}
