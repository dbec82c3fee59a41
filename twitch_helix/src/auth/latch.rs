//! Single-fire value hand-off between tasks.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Why a waiter did not receive a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchError {
    /// The deadline passed before anything fired.
    TimedOut,
    /// Every firing side was dropped without firing.
    Abandoned,
}

/// Write side: the first `fire` wins, later calls are ignored.
pub struct OneShotLatch<T> {
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

/// Read side: consumed by the single waiter.
pub struct LatchWaiter<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> OneShotLatch<T> {
    pub fn new() -> (Arc<Self>, LatchWaiter<T>) {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(Self {
            slot: Mutex::new(Some(tx)),
        });
        (latch, LatchWaiter { rx })
    }

    /// Delivers `value` if nothing was delivered before. Returns whether this
    /// call was the one that fired.
    pub fn fire(&self, value: T) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // A dropped waiter still consumes the latch.
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl<T> LatchWaiter<T> {
    pub async fn wait(self, timeout: Duration) -> Result<T, LatchError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(LatchError::Abandoned),
            Err(_) => Err(LatchError::TimedOut),
        }
    }
}
