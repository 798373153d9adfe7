//! Per-read deadline for upstream byte sources.
//!
//! [`TimeoutReader`] wraps any [`AsyncRead`] and moves it onto a dedicated
//! worker task.  Every call to [`TimeoutReader::read`] hands the worker a read
//! request and then races three outcomes:
//!
//! 1. the worker finishes with data or a genuine I/O error,
//! 2. the reader is closed through a [`ReaderCloser`] (graceful EOF),
//! 3. the deadline fires ([`ReadError::Timeout`]).
//!
//! A request that times out stays in flight.  Whatever the worker eventually
//! produces for it is delivered by a later `read` call and is never thrown
//! away, even when the worker finishes at the same instant the deadline fires.
//!
//! Closing the reader drops the wrapped source on the worker task.  For
//! sources whose only cancellation mechanism is being closed, this is what
//! unblocks a read that would otherwise hang forever.  With
//! `close_on_timeout` set, a timeout closes the source as well.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Failure of a single [`TimeoutReader::read`] call.
#[derive(Debug, Error)]
pub enum ReadError {
    /// No byte arrived within the deadline.  The reader stays usable unless it
    /// was configured to close on timeout.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The wrapped source reported an error.
    #[error("upstream read failed: {0}")]
    Io(#[from] io::Error),
}

impl ReadError {
    /// Returns `true` for [`ReadError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadError::Timeout(_))
    }
}

// ── Closer ────────────────────────────────────────────────────────────────────

/// Cloneable handle that closes a [`TimeoutReader`] from any task.
#[derive(Debug, Clone)]
pub struct ReaderCloser {
    state: Arc<watch::Sender<bool>>,
}

impl ReaderCloser {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { state: Arc::new(tx) }
    }

    /// Closes the reader.  Idempotent; returns `true` only for the call that
    /// actually performed the close.
    pub fn close(&self) -> bool {
        !self.state.send_replace(true)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the reader is closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a dropped
        // channel while we are waiting on it.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// A byte source with a per-read deadline and optional close-on-timeout.
///
/// Must be created from within a Tokio runtime.
pub struct TimeoutReader {
    timeout: Option<Duration>,
    close_on_timeout: bool,
    requests: mpsc::Sender<usize>,
    results: mpsc::Receiver<io::Result<Vec<u8>>>,
    /// `true` while a request has been handed to the worker but its result has
    /// not been collected yet.
    in_flight: bool,
    /// Bytes produced by the worker that did not fit the caller's buffer.
    leftover: Vec<u8>,
    leftover_pos: usize,
    closer: ReaderCloser,
}

enum Outcome {
    Finished(Option<io::Result<Vec<u8>>>),
    Closed,
    TimedOut(Duration),
}

impl TimeoutReader {
    /// Wraps `source`.  With `timeout = None` reads never time out and the
    /// reader only adds close-from-anywhere semantics.
    pub fn new<R>(source: R, timeout: Option<Duration>, close_on_timeout: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (requests_tx, requests_rx) = mpsc::channel(1);
        let (results_tx, results_rx) = mpsc::channel(1);
        let closer = ReaderCloser::new();

        tokio::spawn(read_worker(
            source,
            requests_rx,
            results_tx,
            closer.clone(),
        ));

        Self {
            timeout,
            close_on_timeout,
            requests: requests_tx,
            results: results_rx,
            in_flight: false,
            leftover: Vec::new(),
            leftover_pos: 0,
            closer,
        }
    }

    /// Returns a handle that can close this reader from another task.
    pub fn closer(&self) -> ReaderCloser {
        self.closer.clone()
    }

    /// Closes the reader.  See [`ReaderCloser::close`].
    pub fn close(&self) -> bool {
        self.closer.close()
    }

    /// The configured per-read deadline.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Reads at least one byte into `buf`.
    ///
    /// Returns `Ok(0)` at end of stream and once the reader has been closed,
    /// including when the close races this call.
    ///
    /// # Errors
    ///
    /// - [`ReadError::Timeout`] if nothing arrived within the deadline.
    /// - [`ReadError::Io`] if the source failed.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.leftover_pos < self.leftover.len() {
            return Ok(self.drain_leftover(buf));
        }
        if self.closer.is_closed() {
            return Ok(0);
        }

        if !self.in_flight {
            if self.requests.send(buf.len()).await.is_err() {
                // The worker is gone, which only happens after a close.
                return Ok(0);
            }
            self.in_flight = true;
        }

        let outcome = match self.timeout {
            Some(limit) => {
                tokio::select! {
                    biased;
                    result = self.results.recv() => Outcome::Finished(result),
                    () = self.closer.closed() => Outcome::Closed,
                    () = tokio::time::sleep(limit) => Outcome::TimedOut(limit),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    result = self.results.recv() => Outcome::Finished(result),
                    () = self.closer.closed() => Outcome::Closed,
                }
            }
        };

        match outcome {
            Outcome::Finished(result) => self.complete(result, buf),
            Outcome::Closed => Ok(0),
            Outcome::TimedOut(limit) => {
                // The worker may have completed at the same instant the
                // deadline fired; its result must still be delivered.
                if let Ok(result) = self.results.try_recv() {
                    return self.complete(Some(result), buf);
                }
                if self.close_on_timeout && self.closer.close() {
                    debug!("upstream read timed out after {limit:?}; source closed");
                }
                Err(ReadError::Timeout(limit))
            }
        }
    }

    fn complete(
        &mut self,
        result: Option<io::Result<Vec<u8>>>,
        buf: &mut [u8],
    ) -> Result<usize, ReadError> {
        self.in_flight = false;
        match result {
            Some(Ok(data)) => {
                self.leftover = data;
                self.leftover_pos = 0;
                Ok(self.drain_leftover(buf))
            }
            Some(Err(e)) => Err(ReadError::Io(e)),
            // Worker exited: the reader was closed.
            None => Ok(0),
        }
    }

    fn drain_leftover(&mut self, buf: &mut [u8]) -> usize {
        let remaining = &self.leftover[self.leftover_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.leftover_pos += n;
        if self.leftover_pos == self.leftover.len() {
            self.leftover.clear();
            self.leftover_pos = 0;
        }
        n
    }
}

impl Drop for TimeoutReader {
    fn drop(&mut self) {
        self.closer.close();
    }
}

impl std::fmt::Debug for TimeoutReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutReader")
            .field("timeout", &self.timeout)
            .field("close_on_timeout", &self.close_on_timeout)
            .field("in_flight", &self.in_flight)
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

/// Owns the source and performs one read per request until closed.
async fn read_worker<R>(
    mut source: R,
    mut requests: mpsc::Receiver<usize>,
    results: mpsc::Sender<io::Result<Vec<u8>>>,
    closer: ReaderCloser,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        let len = tokio::select! {
            request = requests.recv() => match request {
                Some(len) => len,
                None => break,
            },
            () = closer.closed() => break,
        };

        let mut buf = vec![0u8; len];
        let read = tokio::select! {
            result = source.read(&mut buf) => Some(result),
            () = closer.closed() => None,
        };
        let Some(result) = read else { break };

        let result = result.map(|n| {
            buf.truncate(n);
            buf
        });
        if results.send(result).await.is_err() {
            break;
        }
    }
    // Dropping the source here is what closes it.
    drop(source);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
