//! Bounded FIFO carrying terminal resize events to the remote execution
//! channel.
//!
//! The inbound relay is the only producer; the execution channel is the only
//! consumer.  Events are never coalesced or dropped: a full queue blocks the
//! producer until the consumer catches up.  Resize events are rare, so this is
//! an acceptable point of backpressure.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::messages::TerminalSize;

/// Default number of resize events that can wait in the queue.
pub const DEFAULT_CAPACITY: usize = 20;

/// Returned by [`SizeSender::put`] once the consumer half has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("terminal size queue is closed")]
pub struct QueueClosed;

/// Constructor for the sender/receiver pair of a resize queue.
pub struct TerminalSizeQueue;

impl TerminalSizeQueue {
    /// Creates a queue holding at most `capacity` pending events.
    ///
    /// A capacity of zero is raised to one; the queue always holds at least
    /// one event.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use podlink_core::{TerminalSize, TerminalSizeQueue};
    ///
    /// # tokio_test::block_on(async {
    /// let (tx, mut rx) = TerminalSizeQueue::with_capacity(4);
    /// tx.put(TerminalSize { width: 80, height: 24 }).await.unwrap();
    /// assert_eq!(rx.next().await, Some(TerminalSize { width: 80, height: 24 }));
    /// # });
    /// ```
    pub fn with_capacity(capacity: usize) -> (SizeSender, SizeReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (
            SizeSender { inner: tx, capacity },
            SizeReceiver { inner: rx },
        )
    }
}

/// Producer half, held by the inbound relay.
#[derive(Debug, Clone)]
pub struct SizeSender {
    inner: mpsc::Sender<TerminalSize>,
    capacity: usize,
}

impl SizeSender {
    /// Enqueues `size`, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the receiver has been dropped.
    pub async fn put(&self, size: TerminalSize) -> Result<(), QueueClosed> {
        self.inner.send(size).await.map_err(|_| QueueClosed)
    }

    /// Maximum number of events the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer half, handed to the remote execution channel.
#[derive(Debug)]
pub struct SizeReceiver {
    inner: mpsc::Receiver<TerminalSize>,
}

impl SizeReceiver {
    /// Dequeues the oldest event, waiting while the queue is empty.
    ///
    /// Returns `None` once every sender has been dropped and the queue is
    /// drained.
    pub async fn next(&mut self) -> Option<TerminalSize> {
        self.inner.recv().await
    }
}
