//! Backing store
//!
//! The cache the dispatch engine executes against. The engine only needs
//! `get`/`set`/`remove`; anything implementing [`CacheStore`] can be
//! injected. [`MemoryStore`] is the in-process default.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::protocol::EntryOptions;

/// Minimal interface the dispatch engine requires of a backing cache.
///
/// Implementations must be safe for concurrent access from many
/// dispatch workers.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key` with the resolved expiration policy
    fn set(&self, key: &str, value: Vec<u8>, policy: &EntryOptions);

    /// Fetch the value at `key`. A read extends a sliding expiration
    /// window as a side effect.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Evict `key` if present
    fn remove(&self, key: &str);
}

/// One stored value with its lifetime bookkeeping
struct StoredEntry {
    value: Vec<u8>,

    /// Hard ceiling from the absolute policies; sliding never extends
    /// past this
    hard_deadline: Option<Instant>,

    /// Sliding window length, re-armed on each read
    sliding: Option<Duration>,

    /// Next instant at which the entry is dead
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Re-arm the sliding window, clamped to the hard deadline
    fn touch(&mut self, now: Instant) {
        if let Some(window) = self.sliding {
            let slid = now + window;
            self.expires_at = Some(match self.hard_deadline {
                Some(hard) => slid.min(hard),
                None => slid,
            });
        }
    }
}

/// In-memory cache with absolute and sliding expiration.
///
/// Expired entries are evicted lazily on read; no background reaper runs.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries, including any not yet lazily evicted
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryStore {
    fn set(&self, key: &str, value: Vec<u8>, policy: &EntryOptions) {
        let now = Instant::now();
        let hard_deadline = resolve_hard_deadline(policy, now);
        let sliding = policy.sliding_expiration;

        let mut entry = StoredEntry {
            value,
            hard_deadline,
            sliding,
            expires_at: hard_deadline,
        };
        entry.touch(now);

        self.entries.write().insert(key.to_string(), entry);
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        match entries.get_mut(key) {
            None => return None,
            Some(entry) => {
                if !entry.expired(now) {
                    entry.touch(now);
                    return Some(entry.value.clone());
                }
            }
        }

        // Expired: evict lazily on the way out
        entries.remove(key);
        None
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// Earliest of the two absolute policies, as a monotonic instant
fn resolve_hard_deadline(policy: &EntryOptions, now: Instant) -> Option<Instant> {
    let from_wall = policy.absolute_expiration.map(|unix_ms| {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        if unix_ms > now_ms {
            now + Duration::from_millis(unix_ms - now_ms)
        } else {
            now
        }
    });
    let from_relative = policy.absolute_expiration_relative.map(|d| now + d);

    match (from_wall, from_relative) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (some, None) => some,
        (None, some) => some,
    }
}
