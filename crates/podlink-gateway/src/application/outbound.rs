//! Upstream-to-browser direction of a session.
//!
//! One loop multiplexes every upstream pump with the keepalive ticker.  Each
//! chunk becomes exactly one binary frame; the chunk is acknowledged after
//! the write, which lets its pump read again.
//!
//! Frames of one stream keep their read order.  There is no ordering between
//! stdout and stderr frames: when both pumps have a chunk ready the loop takes
//! either one.

use std::sync::Arc;
use std::time::Duration;

use podlink_core::{encode_server_message, Chunk, PumpExit, PumpHandle, ServerMessage, StreamKind};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::application::session::{Session, WsSink};
use crate::application::transport::{classify, ErrorClass};
use crate::domain::CloseReason;

enum Event {
    Chunk(Option<Chunk>, usize),
    Exit(Option<PumpExit>),
    Ping,
    Closed,
}

/// Relays upstream chunks and keepalive pings until every pump has ended or
/// the session closes.  Closes the session with the appropriate reason.
pub async fn run_outbound<S: WsSink>(
    session: Arc<Session<S>>,
    pumps: Vec<PumpHandle>,
    mut exits: mpsc::Receiver<PumpExit>,
    ping_interval: Duration,
) {
    let id = session.id();
    let mut pumps: Vec<Option<PumpHandle>> = pumps.into_iter().map(Some).collect();
    let mut running = pumps.len();

    let mut ticker = interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick resolves immediately; skip it.
    ticker.tick().await;

    loop {
        let event = tokio::select! {
            (chunk, index) = next_chunk(&mut pumps) => Event::Chunk(chunk, index),
            exit = exits.recv() => Event::Exit(exit),
            _ = ticker.tick() => Event::Ping,
            () = session.closed() => Event::Closed,
        };

        match event {
            Event::Chunk(Some(chunk), _) => {
                let frame = encode_server_message(&to_server_message(&chunk));
                let result = session.send(Message::Binary(frame)).await;
                chunk.ack();
                if let Err(reason) = check_write(&session, result, "data") {
                    session.close_all(reason).await;
                    return;
                }
            }
            Event::Chunk(None, index) => {
                // The pump finished; its exit report follows on `exits`.
                pumps[index] = None;
            }
            Event::Exit(Some(PumpExit { kind, result: Ok(()) })) => {
                running -= 1;
                debug!("session {id}: {kind} reached end of stream");
                if running == 0 {
                    session.close_all(CloseReason::Completed).await;
                    return;
                }
            }
            Event::Exit(Some(PumpExit { kind, result: Err(e) })) => {
                session
                    .close_all(CloseReason::Upstream(format!("{kind} read failed: {e}")))
                    .await;
                return;
            }
            Event::Exit(None) => {
                session.close_all(CloseReason::Completed).await;
                return;
            }
            Event::Ping => {
                let result = session.send(Message::Ping(Vec::new())).await;
                if let Err(reason) = check_write(&session, result, "ping") {
                    session.close_all(reason).await;
                    return;
                }
                trace!("session {id}: ping sent");
            }
            Event::Closed => return,
        }
    }
}

/// Waits for a chunk from any live pump.  Never resolves when none is left.
async fn next_chunk(pumps: &mut [Option<PumpHandle>]) -> (Option<Chunk>, usize) {
    let live = pumps
        .iter_mut()
        .enumerate()
        .filter_map(|(i, p)| p.as_mut().map(|p| (i, p)));
    let receivers: Vec<_> = live
        .map(|(i, p)| Box::pin(async move { (p.chunks.recv().await, i) }))
        .collect();
    if receivers.is_empty() {
        return std::future::pending().await;
    }
    futures_util::future::select_all(receivers).await.0
}

fn to_server_message(chunk: &Chunk) -> ServerMessage {
    let data = chunk.data.clone();
    match chunk.kind {
        StreamKind::Stdout => ServerMessage::StdoutChunk(data),
        StreamKind::Stderr => ServerMessage::StderrChunk(data),
        StreamKind::Log => ServerMessage::TextChunk(data),
    }
}

/// Maps a write result to "keep going" or the reason to close.
fn check_write<S: WsSink>(
    session: &Session<S>,
    result: Result<(), WsError>,
    what: &str,
) -> Result<(), CloseReason> {
    let id = session.id();
    let Err(e) = result else { return Ok(()) };
    if session.is_closed() {
        // Someone else already tore the session down; the reason is recorded.
        return Err(CloseReason::Completed);
    }
    match classify(&e) {
        ErrorClass::Transient => {
            debug!("session {id}: transient {what} write error: {e}");
            Ok(())
        }
        ErrorClass::Fatal => {
            debug!("session {id}: {what} write failed: {e}");
            Err(CloseReason::Transport(e.to_string()))
        }
        ErrorClass::Unclassified => {
            warn!("session {id}: unexpected {what} write error: {e}");
            Err(CloseReason::Transport(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::ws_pair;
    use futures_util::StreamExt;
    use podlink_core::{decode_server_message, spawn_pump, Framing, TimeoutPolicy, TimeoutReader};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_each_stream_becomes_its_own_frame_kind() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (sink, _rx) = server.split();
        let session = Session::new(Uuid::new_v4(), sink, Duration::from_secs(1));
        let (done_tx, done_rx) = mpsc::channel(2);
        let stdout = TimeoutReader::new(&b"out"[..], None, false);
        let stderr = TimeoutReader::new(&b"err"[..], None, false);
        let pumps = vec![
            spawn_pump(StreamKind::Stdout, stdout, 64, Framing::Raw, TimeoutPolicy::Retry, done_tx.clone()),
            spawn_pump(StreamKind::Stderr, stderr, 64, Framing::Raw, TimeoutPolicy::Retry, done_tx),
        ];

        // Act
        run_outbound(Arc::clone(&session), pumps, done_rx, Duration::from_secs(60)).await;

        // Assert: both frames arrive (in either order), then a normal close
        let mut frames = Vec::new();
        while let Some(Ok(msg)) = client.next().await {
            match msg {
                Message::Binary(bytes) => frames.push(decode_server_message(&bytes).unwrap()),
                Message::Close(Some(frame)) => {
                    assert_eq!(u16::from(frame.code), 1000);
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        frames.sort_by_key(|f| f.message_type() as u8);
        assert_eq!(
            frames,
            vec![
                ServerMessage::StdoutChunk(b"out".to_vec()),
                ServerMessage::StderrChunk(b"err".to_vec()),
            ]
        );
        assert_eq!(session.close_reason(), Some(&CloseReason::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_are_sent_while_idle() {
        // Arrange: a log stream that stays silent
        let (server, mut client) = ws_pair().await;
        let (sink, _rx) = server.split();
        let session = Session::new(Uuid::new_v4(), sink, Duration::from_secs(1));
        let (done_tx, done_rx) = mpsc::channel(1);
        let (_upstream, source) = tokio::io::duplex(8);
        let reader = TimeoutReader::new(source, Some(Duration::from_secs(1)), false);
        let pump = spawn_pump(StreamKind::Log, reader, 64, Framing::Lines, TimeoutPolicy::Retry, done_tx);
        let outbound = tokio::spawn(run_outbound(
            Arc::clone(&session),
            vec![pump],
            done_rx,
            Duration::from_secs(10),
        ));

        // Act
        tokio::time::sleep(Duration::from_secs(25)).await;
        session.close_all(CloseReason::PeerClosed).await;
        outbound.await.unwrap();

        // Assert
        let mut pings = 0;
        while let Some(Ok(msg)) = client.next().await {
            match msg {
                Message::Ping(_) => pings += 1,
                Message::Close(_) => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(pings, 2);
    }

    #[tokio::test]
    async fn test_upstream_read_error_closes_abnormally() {
        let (server, _client) = ws_pair().await;
        let (sink, _rx) = server.split();
        let session = Session::new(Uuid::new_v4(), sink, Duration::from_secs(1));
        let (done_tx, done_rx) = mpsc::channel(1);
        let source = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::Other, "pipe exploded"))
            .build();
        let reader = TimeoutReader::new(source, None, false);
        let pump = spawn_pump(StreamKind::Stdout, reader, 64, Framing::Raw, TimeoutPolicy::Retry, done_tx);

        run_outbound(Arc::clone(&session), vec![pump], done_rx, Duration::from_secs(60)).await;

        let reason = session.close_reason().cloned().unwrap();
        assert_eq!(reason.close_code(), 1011);
        assert!(reason.to_string().contains("pipe exploded"));
    }
}
