//! Time-bounded key/value cache
//!
//! Entries expire `ttl` after insertion. Expired entries are dropped lazily
//! when looked up, in bulk by [`TtlCache::cleanup`], or all at once by
//! [`TtlCache::clear`]. `cleanup_if_due` debounces sweeps so callers can
//! invoke it on every write without paying for a full scan each time.
//!
//! # Thread Safety
//!
//! The map sits behind a `parking_lot::RwLock`. Lookups of live entries take
//! the read lock only; the write lock is taken for inserts, sweeps and for
//! evicting an entry found expired during lookup.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::trace;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= ttl
    }
}

/// Cache statistics for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Current number of stored entries, expired or not
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate from 0.0 to 1.0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<FxHashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    cleanup_interval: Duration,
    last_cleanup: Mutex<Instant>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates a cache with the default TTL (5 minutes) and cleanup interval (30 seconds)
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL, DEFAULT_CLEANUP_INTERVAL)
    }

    pub fn with_ttl(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            ttl,
            cleanup_interval,
            last_cleanup: Mutex::new(Instant::now()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Returns the value if present and younger than the TTL
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(self.ttl, now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: re-check under the write lock, a writer may have refreshed it
        let mut entries = self.entries.write();
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(self.ttl, now))
        {
            entries.remove(key);
            trace!("Evicted expired cache entry on lookup");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value`, replacing any previous entry for `key`
    pub fn set(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        self.entries.write().insert(key, entry);
    }

    /// Removes every expired entry, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
        *self.last_cleanup.lock() = now;

        let removed = before - entries.len();
        if removed > 0 {
            trace!("Cache cleanup removed {} expired entries", removed);
        }
        removed
    }

    /// Runs [`cleanup`](Self::cleanup) if the cleanup interval has elapsed
    pub fn cleanup_if_due(&self) -> usize {
        let due = self.last_cleanup.lock().elapsed() >= self.cleanup_interval;
        if due { self.cleanup() } else { 0 }
    }

    /// Drops all entries unconditionally
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(|entry| entry.value)
    }

    /// Removes every entry whose key matches `predicate`
    pub fn remove_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
