//! Call correlation table
//!
//! Client-side bookkeeping for outstanding requests: three correlated
//! maps keyed by request identifier (the original request, the
//! single-assignment result slot, and the deadline). Every registered
//! call is resolved exactly once, by a matching response, by the
//! timeout sweep, or cancelled eagerly by the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{CacheError, Result};
use crate::protocol::{Request, Response};

/// Sweep cadence for a given query timeout: tight timeouts get a tight
/// sweep
pub fn sweep_interval(query_timeout: Duration) -> Duration {
    if query_timeout < Duration::from_secs(5) {
        Duration::from_millis(100)
    } else {
        Duration::from_millis(1000)
    }
}

/// The three correlated maps, guarded by one lock so insertion and
/// removal stay atomic across all of them
#[derive(Default)]
struct Maps {
    requests: HashMap<u64, Request>,
    slots: HashMap<u64, Sender<Response>>,
    deadlines: HashMap<u64, Instant>,
}

/// Correlation table shared by the issuing callers, the response path,
/// and the timeout sweep
pub struct CallTable {
    maps: Mutex<Maps>,

    /// Process-local, never reset on reconnect
    next_id: AtomicU64,
}

impl CallTable {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Assign the next request identifier
    pub fn next_identifier(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a request in all three maps and hand back the reply
    /// handle the caller blocks on
    pub fn register(&self, request: Request, deadline: Instant) -> PendingReply {
        let identifier = request.identifier;
        let (tx, rx) = bounded(1);

        let mut maps = self.maps.lock();
        maps.requests.insert(identifier, request);
        maps.slots.insert(identifier, tx);
        maps.deadlines.insert(identifier, deadline);

        PendingReply { identifier, rx }
    }

    /// Resolve a call with an incoming response.
    ///
    /// Identifiers no longer registered (already timed out or cancelled)
    /// are ignored.
    pub fn resolve(&self, response: Response) {
        let slot = {
            let mut maps = self.maps.lock();
            let slot = maps.slots.remove(&response.identifier);
            if slot.is_some() {
                maps.requests.remove(&response.identifier);
                maps.deadlines.remove(&response.identifier);
            }
            slot
        };
        if let Some(tx) = slot {
            // bounded(1) + removal under the lock make this the only
            // assignment this slot will ever see
            let _ = tx.try_send(response);
        }
    }

    /// Caller-initiated removal; the slot is dropped unresolved
    pub fn cancel(&self, identifier: u64) {
        let mut maps = self.maps.lock();
        maps.requests.remove(&identifier);
        maps.slots.remove(&identifier);
        maps.deadlines.remove(&identifier);
    }

    /// Resolve every call whose deadline has passed with a synthetic
    /// Timeout response. Returns how many expired.
    pub fn expire_due(&self, now: Instant) -> usize {
        let expired: Vec<(u64, Sender<Response>)> = {
            let mut maps = self.maps.lock();
            let due: Vec<u64> = maps
                .deadlines
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(id, _)| *id)
                .collect();

            due.into_iter()
                .filter_map(|id| {
                    maps.requests.remove(&id);
                    maps.deadlines.remove(&id);
                    maps.slots.remove(&id).map(|tx| (id, tx))
                })
                .collect()
        };

        let count = expired.len();
        for (identifier, tx) in expired {
            let _ = tx.try_send(Response::timeout(identifier));
        }
        count
    }

    /// Number of outstanding calls
    pub fn in_flight(&self) -> usize {
        self.maps.lock().slots.len()
    }
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one outstanding call
pub struct PendingReply {
    identifier: u64,
    rx: Receiver<Response>,
}

impl PendingReply {
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    /// Block until the call resolves.
    ///
    /// `limit` is a backstop only; the timeout sweep resolves overdue
    /// calls well before a sane limit elapses.
    pub fn wait(self, limit: Duration) -> Result<Response> {
        match self.rx.recv_timeout(limit) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(CacheError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CacheError::Cancelled),
        }
    }
}
