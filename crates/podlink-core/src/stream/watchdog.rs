//! One-shot, kickable countdown timer used to detect a silent peer.
//!
//! A [`Watchdog`] starts counting down as soon as it is created.  Every call to
//! [`Watchdog::kick`] restarts the countdown.  If the countdown reaches zero
//! the expiry callback runs exactly once and the watchdog is dead from then
//! on.  Dropping or disarming the watchdog before expiry cancels the callback.
//!
//! The countdown is a single `tokio::time::Sleep` that is reset in place on
//! each kick, so repeated kicks never allocate new timers.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Kickable countdown with an exactly-once expiry callback.
///
/// Must be created from within a Tokio runtime: the countdown runs on a
/// spawned task.
pub struct Watchdog {
    timeout: Duration,
    kick: Arc<Notify>,
    kicks: Arc<AtomicU64>,
    expired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Arms a new watchdog that calls `on_expire` if it is not kicked for
    /// `timeout`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use podlink_core::Watchdog;
    ///
    /// # tokio_test::block_on(async {
    /// let dog = Watchdog::new(Duration::from_secs(30), || println!("peer went silent"));
    /// dog.kick();
    /// assert_eq!(dog.kicks(), 1);
    /// # });
    /// ```
    pub fn new<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let kick = Arc::new(Notify::new());
        let kicks = Arc::new(AtomicU64::new(0));
        let expired = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(countdown(
            timeout,
            Arc::clone(&kick),
            Arc::clone(&expired),
            on_expire,
        ));

        Self {
            timeout,
            kick,
            kicks,
            expired,
            task,
        }
    }

    /// Restarts the countdown.  Safe to call from any task; a no-op once the
    /// watchdog has expired or been disarmed.
    pub fn kick(&self) {
        if self.expired.load(Ordering::Acquire) || self.task.is_finished() {
            return;
        }
        self.kicks.fetch_add(1, Ordering::Relaxed);
        // `notify_one` stores a permit if the countdown task is not currently
        // waiting, so a kick is never lost between two select iterations.
        self.kick.notify_one();
    }

    /// Number of kicks accepted so far.
    pub fn kicks(&self) -> u64 {
        self.kicks.load(Ordering::Relaxed)
    }

    /// Returns `true` once the expiry callback has run.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// The countdown length.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cancels the countdown.  The expiry callback will not run afterwards
    /// unless it is already running.
    pub fn disarm(&self) {
        self.task.abort();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("timeout", &self.timeout)
            .field("kicks", &self.kicks())
            .field("expired", &self.is_expired())
            .finish()
    }
}

async fn countdown<F>(timeout: Duration, kick: Arc<Notify>, expired: Arc<AtomicBool>, on_expire: F)
where
    F: FnOnce() + Send + 'static,
{
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => {
                expired.store(true, Ordering::Release);
                debug!("watchdog expired after {timeout:?} without a kick");
                on_expire();
                return;
            }
            () = kick.notified() => {
                sleep.as_mut().reset(Instant::now() + timeout);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
