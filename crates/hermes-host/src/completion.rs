//! Single-assignment result cell.
//!
//! A dispatch can be resolved from two places: the response's completion
//! callback and the task that runs the handler. Whichever calls
//! [`CompletionCell::try_resolve`] first wins; later attempts are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A write-once slot feeding a oneshot receiver.
#[derive(Debug)]
pub struct CompletionCell<T> {
    resolved: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CompletionCell<T> {
    /// Creates a cell and the receiver that observes its value.
    #[must_use]
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let cell = Arc::new(Self {
            resolved: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        });
        (cell, rx)
    }

    /// Stores `value` if the cell is still empty.
    ///
    /// Returns `true` for the single call that won. A value sent after the
    /// receiver was dropped is discarded, but still counts as the winner.
    pub fn try_resolve(&self, value: T) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(value);
        }
        true
    }

    /// Returns `true` once a value has been stored.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}
