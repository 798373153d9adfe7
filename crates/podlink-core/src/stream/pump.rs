//! Upstream-to-relay pump with a one-chunk-in-flight handshake.
//!
//! A pump owns one [`TimeoutReader`] and forwards what it reads as [`Chunk`]s.
//! After handing a chunk over it waits for the consumer to acknowledge it
//! before reading again, so at most one chunk per stream is ever waiting to
//! be written to the peer.  When the stream ends the pump reports a
//! [`PumpExit`] on the shared done channel.
//!
//! With [`Framing::Lines`] every chunk is one newline-terminated line (or a
//! `chunk_size` slice of an overlong one).  An unterminated tail is flushed
//! when the stream ends, or as soon as a read times out, so a prompt or a
//! progress line is not held back while the source is quiet.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::timeout_reader::{ReadError, TimeoutReader};

/// Which upstream stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
    Log,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
            StreamKind::Log => "log",
        };
        f.write_str(name)
    }
}

/// What the pump does when a read times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Treat the timeout as the end of the stream.
    EndOfStream,
    /// Keep reading; a timeout only means the source is quiet.
    Retry,
}

/// How upstream bytes are cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Whatever a single read returned.
    Raw,
    /// One line per chunk.
    Lines,
}

/// One block of upstream bytes waiting to be relayed.
#[derive(Debug)]
pub struct Chunk {
    pub kind: StreamKind,
    pub data: Vec<u8>,
    ack: oneshot::Sender<()>,
}

impl Chunk {
    /// Signals the pump that this chunk has been handled and it may read the
    /// next one.  Dropping a chunk without acknowledging it stops the pump.
    pub fn ack(self) {
        let _ = self.ack.send(());
    }
}

/// Final report of a pump.
#[derive(Debug)]
pub struct PumpExit {
    pub kind: StreamKind,
    /// `Ok(())` for a clean end of stream.
    pub result: Result<(), ReadError>,
}

/// Consumer side of a running pump.  Dropping it stops the pump task, which in
/// turn closes the wrapped reader.
#[derive(Debug)]
pub struct PumpHandle {
    pub kind: StreamKind,
    pub chunks: mpsc::Receiver<Chunk>,
    task: JoinHandle<()>,
}

impl PumpHandle {
    /// Returns `true` once the pump task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a pump reading up to `chunk_size` bytes at a time from `reader`.
///
/// The exit is reported on `done` unless the consumer went away first.
pub fn spawn_pump(
    kind: StreamKind,
    reader: TimeoutReader,
    chunk_size: usize,
    framing: Framing,
    policy: TimeoutPolicy,
    done: mpsc::Sender<PumpExit>,
) -> PumpHandle {
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(run_pump(
        kind,
        reader,
        chunk_size.max(1),
        framing,
        policy,
        tx,
        done,
    ));
    PumpHandle {
        kind,
        chunks: rx,
        task,
    }
}

async fn run_pump(
    kind: StreamKind,
    mut reader: TimeoutReader,
    chunk_size: usize,
    framing: Framing,
    policy: TimeoutPolicy,
    chunks: mpsc::Sender<Chunk>,
    done: mpsc::Sender<PumpExit>,
) {
    let mut buf = vec![0u8; chunk_size];
    let mut pending = Vec::new();

    let result = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) if e.is_timeout() => match policy {
                TimeoutPolicy::Retry => {
                    if !pending.is_empty()
                        && !deliver(&chunks, kind, std::mem::take(&mut pending)).await
                    {
                        trace!("{kind} pump: consumer gone");
                        return;
                    }
                    continue;
                }
                TimeoutPolicy::EndOfStream => {
                    debug!("{kind} pump: read timed out, treating as end of stream");
                    break Ok(());
                }
            },
            Err(e) => break Err(e),
        };

        let delivered = match framing {
            Framing::Raw => deliver(&chunks, kind, buf[..n].to_vec()).await,
            Framing::Lines => {
                pending.extend_from_slice(&buf[..n]);
                let mut ok = true;
                for line in split_lines(&mut pending, chunk_size) {
                    if !deliver(&chunks, kind, line).await {
                        ok = false;
                        break;
                    }
                }
                ok
            }
        };
        if !delivered {
            trace!("{kind} pump: consumer gone");
            return;
        }
    };

    if !pending.is_empty() && !deliver(&chunks, kind, pending).await {
        return;
    }
    let _ = done.send(PumpExit { kind, result }).await;
}

/// Hands one chunk over and waits for its acknowledgement.  Returns `false`
/// once the consumer is gone.
async fn deliver(chunks: &mpsc::Sender<Chunk>, kind: StreamKind, data: Vec<u8>) -> bool {
    let (ack_tx, ack_rx) = oneshot::channel();
    let chunk = Chunk {
        kind,
        data,
        ack: ack_tx,
    };
    chunks.send(chunk).await.is_ok() && ack_rx.await.is_ok()
}

/// Removes every complete line from `pending`, cutting lines longer than
/// `max` into `max`-sized pieces.
fn split_lines(pending: &mut Vec<u8>, max: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        match pending.iter().position(|&b| b == b'\n') {
            Some(pos) if pos < max => out.push(pending.drain(..=pos).collect()),
            _ if pending.len() >= max => out.push(pending.drain(..max).collect()),
            _ => break,
        }
    }
    out
}
