//! Per-connection session and its exactly-once shutdown coordinator.
//!
//! A [`Session`] owns everything that belongs to one browser connection: the
//! WebSocket write half, the upstream readers (through their closers), the
//! stdin pipe and the keepalive watchdog.  The relays share it through an
//! `Arc` and any of them may call [`Session::close_all`]; the first caller
//! tears everything down and every later call is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use podlink_core::{ReaderCloser, Watchdog};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::provider::BoxWriter;
use crate::domain::CloseReason;

/// Write half of a browser connection.
pub trait WsSink: Sink<Message, Error = WsError> + Unpin + Send + 'static {}

impl<T> WsSink for T where T: Sink<Message, Error = WsError> + Unpin + Send + 'static {}

pub struct Session<S> {
    id: Uuid,
    sink: tokio::sync::Mutex<S>,
    close_grace: Duration,
    closing: AtomicBool,
    closed: watch::Sender<bool>,
    reason: OnceLock<CloseReason>,
    readers: Mutex<Vec<ReaderCloser>>,
    stdin: tokio::sync::Mutex<Option<BoxWriter>>,
    watchdog: Mutex<Option<Watchdog>>,
}

impl<S: WsSink> Session<S> {
    pub fn new(id: Uuid, sink: S, close_grace: Duration) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id,
            sink: tokio::sync::Mutex::new(sink),
            close_grace,
            closing: AtomicBool::new(false),
            closed,
            reason: OnceLock::new(),
            readers: Mutex::new(Vec::new()),
            stdin: tokio::sync::Mutex::new(None),
            watchdog: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The reason recorded by the winning [`close_all`](Self::close_all).
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.reason.get()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once teardown has started.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    // ── Owned resources ───────────────────────────────────────────────────────

    /// Registers an upstream reader so teardown closes it.  A reader attached
    /// after teardown is closed immediately.
    pub fn attach_reader(&self, closer: ReaderCloser) {
        if self.is_closed() {
            closer.close();
            return;
        }
        lock(&self.readers).push(closer);
        // close_all may have drained the list between the check and the push.
        if self.is_closed() {
            for closer in lock(&self.readers).drain(..) {
                closer.close();
            }
        }
    }

    pub async fn attach_stdin(&self, writer: BoxWriter) {
        *self.stdin.lock().await = Some(writer);
    }

    /// Writes to the remote stdin.  A no-op for sessions without stdin.
    ///
    /// # Errors
    ///
    /// Returns the pipe error, or `BrokenPipe` if the session closed while
    /// the write was pending.
    pub async fn write_stdin(&self, data: &[u8]) -> std::io::Result<()> {
        if self.is_closed() {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        let write = async {
            let mut guard = self.stdin.lock().await;
            match guard.as_mut() {
                Some(stdin) => {
                    stdin.write_all(data).await?;
                    stdin.flush().await
                }
                None => Ok(()),
            }
        };
        tokio::select! {
            result = write => result,
            () = self.closed() => Err(std::io::ErrorKind::BrokenPipe.into()),
        }
    }

    /// Starts the keepalive watchdog; its expiry closes the session with
    /// [`CloseReason::PeerUnresponsive`].
    pub fn arm_watchdog(self: &Arc<Self>, pong_timeout: Duration) {
        let session: Weak<Self> = Arc::downgrade(self);
        let dog = Watchdog::new(pong_timeout, move || {
            tokio::spawn(async move {
                if let Some(session) = session.upgrade() {
                    session.close_all(CloseReason::PeerUnresponsive).await;
                }
            });
        });
        if let Some(old) = lock(&self.watchdog).replace(dog) {
            old.disarm();
        }
    }

    /// Restarts the watchdog countdown; called for every Pong.
    pub fn kick_watchdog(&self) {
        if let Some(dog) = lock(&self.watchdog).as_ref() {
            dog.kick();
        }
    }

    /// Number of Pongs that reset the watchdog so far.
    pub fn watchdog_kicks(&self) -> u64 {
        lock(&self.watchdog).as_ref().map_or(0, Watchdog::kicks)
    }

    // ── Connection ────────────────────────────────────────────────────────────

    /// Sends one message to the browser.  Gives up once the session closes.
    ///
    /// # Errors
    ///
    /// The transport error, or [`WsError::AlreadyClosed`] after teardown.
    pub async fn send(&self, msg: Message) -> Result<(), WsError> {
        if self.is_closed() {
            return Err(WsError::AlreadyClosed);
        }
        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(msg).await
        };
        tokio::select! {
            result = send => result,
            () = self.closed() => Err(WsError::AlreadyClosed),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Tears the session down exactly once.
    ///
    /// Closes every upstream reader, shuts stdin, disarms the watchdog and
    /// sends a Close frame (bounded by the close grace period).  Returns
    /// `true` only for the call that performed the teardown.
    pub async fn close_all(&self, reason: CloseReason) -> bool {
        if self
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let id = self.id;
        let _ = self.reason.set(reason.clone());
        self.closed.send_replace(true);

        let readers: Vec<_> = lock(&self.readers).drain(..).collect();
        for closer in readers {
            closer.close();
        }
        if let Some(dog) = lock(&self.watchdog).take() {
            dog.disarm();
        }

        if let Ok(mut stdin) = timeout(self.close_grace, self.stdin.lock()).await {
            if let Some(mut writer) = stdin.take() {
                let _ = timeout(self.close_grace, writer.shutdown()).await;
            }
        }

        let frame = CloseFrame {
            code: CloseCode::from(reason.close_code()),
            reason: reason.close_text().into(),
        };
        let close = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Close(Some(frame))).await
        };
        match timeout(self.close_grace, close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("session {id}: close frame not delivered: {e}"),
            Err(_) => debug!("session {id}: close frame timed out after {:?}", self.close_grace),
        }

        if reason.is_normal() {
            info!("session {id}: closed ({reason})");
        } else {
            info!("session {id}: closed abnormally ({reason})");
        }
        true
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
