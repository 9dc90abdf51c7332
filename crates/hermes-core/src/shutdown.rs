//! Host-wide shutdown signal and in-flight dispatch tracking.
//!
//! Every host owns exactly one [`ShutdownSignal`]. Requests never hold the
//! signal itself, only a child [`CancellationToken`] obtained from
//! [`ShutdownSignal::token`], so a handler can observe shutdown but cannot
//! trigger it.
//!
//! # Example
//!
//! ```rust
//! use hermes_core::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let token = shutdown.token();
//!
//! assert!(shutdown.cancel());
//! assert!(!shutdown.cancel());
//! assert!(token.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A cancellable signal shared by a host and all of its requests.
///
/// Clones share state: cancelling any clone cancels all of them.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    /// Set exactly once by the winning `cancel` call
    requested: Arc<AtomicBool>,

    /// Parent token; requests only ever see children of it
    source: CancellationToken,
}

impl ShutdownSignal {
    /// Creates a new, untriggered shutdown signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            source: CancellationToken::new(),
        }
    }

    /// Requests shutdown.
    ///
    /// Returns `true` for the single call that performed the cancellation and
    /// `false` for every other call, including concurrent ones.
    pub fn cancel(&self) -> bool {
        if self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.source.cancel();
            true
        } else {
            false
        }
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Returns a read-only view of the signal for a single request.
    ///
    /// Cancelling the returned token does not affect the host.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.source.child_token()
    }

    /// Completes once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.source.cancelled().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts dispatches that have been launched but not yet completed.
///
/// # Example
///
/// ```rust
/// use hermes_core::InFlightTracker;
///
/// let tracker = InFlightTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl InFlightTracker {
    /// Creates a tracker with no active dispatches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one in-flight dispatch until the token is dropped.
    #[must_use]
    pub fn acquire(&self) -> InFlightToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of in-flight dispatches.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until no dispatch is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the load and the
            // await is not missed.
            notified.as_mut().enable();

            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one in-flight dispatch; released on drop.
#[derive(Debug)]
pub struct InFlightToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}
