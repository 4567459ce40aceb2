//! Per-connection session state
//!
//! Created when a connection is accepted, destroyed when it drops;
//! never persisted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::protocol::SessionOptions;

/// Server-side state bound to one live connection
pub struct Session {
    connection_id: u64,

    /// Set by a successful Login, or at creation when credential
    /// checking is disabled
    authenticated: AtomicBool,

    /// Options bound by Login; cache operations fail until these exist
    options: Mutex<Option<SessionOptions>>,

    /// Monotonic request counter, used only for sampled diagnostics
    request_count: AtomicU64,
}

impl Session {
    pub fn new(connection_id: u64, auto_authenticated: bool) -> Self {
        Self {
            connection_id,
            authenticated: AtomicBool::new(auto_authenticated),
            options: Mutex::new(None),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Authenticated with options bound: eligible for cache operations
    pub fn is_ready(&self) -> bool {
        self.is_authenticated() && self.options.lock().is_some()
    }

    /// Bind the login options and mark the session authenticated
    pub fn login(&self, options: SessionOptions) {
        *self.options.lock() = Some(options);
        self.authenticated.store(true, Ordering::SeqCst);
    }

    /// Clear authentication and bound options
    pub fn logout(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
        *self.options.lock() = None;
    }

    /// Snapshot of the bound options
    pub fn options(&self) -> Option<SessionOptions> {
        self.options.lock().clone()
    }

    /// Key as presented to the backing store: prefixed with the bound
    /// instance namespace when one is set
    pub fn effective_key(&self, key: &str) -> String {
        match self.options.lock().as_ref() {
            Some(options) if !options.instance.is_empty() => {
                format!("{}.{}", options.instance, key)
            }
            _ => key.to_string(),
        }
    }

    /// Count one request, returning the new total
    pub fn count_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Widening sampling schedule for request-count summaries: every
/// request up to 10, every 10th up to 100, and so on
pub(crate) fn sampling_boundary(count: u64) -> bool {
    match count {
        0 => false,
        1..=9 => count == 1,
        10..=99 => count % 10 == 0,
        100..=999 => count % 100 == 0,
        1_000..=9_999 => count % 1_000 == 0,
        10_000..=99_999 => count % 10_000 == 0,
        100_000..=999_999 => count % 100_000 == 0,
        _ => count % 1_000_000 == 0,
    }
}
