//! Event bus
//!
//! Unbounded publish/consume queue decoupling transport callbacks from
//! processing. Publishing never blocks; the consumer drains items in
//! arrival order on its own long-running thread until cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// How often the consumer loop re-checks its cancellation flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Unbounded in-process queue with a single consumer loop
pub struct EventBus<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T: Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueue an item; drops it if the consumer is gone
    pub fn publish(&self, item: T) {
        let _ = self.tx.send(item);
    }

    /// Clone a producer handle for another thread
    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    /// Drain items until `stop` is raised or every producer is gone.
    ///
    /// A failing handler is logged and skipped; one malformed item must
    /// never terminate the loop.
    pub fn consume(&self, stop: &AtomicBool, mut handler: impl FnMut(T) -> crate::Result<()>) {
        while !stop.load(Ordering::Relaxed) {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(item) => {
                    if let Err(e) = handler(item) {
                        tracing::warn!("bus consumer error: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl<T: Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
