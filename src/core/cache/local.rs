// src/core/cache/local.rs

//! The in-process cache backend: a bounded LRU map with lazy TTL expiry.

use lru::LruCache;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Maximum number of items held before pruning kicks in.
pub const MAX_ITEMS: usize = 5_000;
/// Number of least-recently-used items dropped per prune pass.
pub const PRUNE_BATCH: usize = 500;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: i64,
    expires_at: Instant,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// A bounded LRU counter store. Expiry is checked on access; there is no
/// background sweeper. All operations take the single internal mutex, which
/// makes read-modify-write increments atomic from the callers' perspective.
pub struct LocalCache {
    items: Mutex<LruCache<String, CacheEntry>>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Returns the counter at `key`, or 0 when absent or expired.
    pub fn get_counter(&self, key: &str) -> i64 {
        let mut items = self.items.lock();
        let expired = match items.get(key) {
            Some(entry) if entry.expired() => true,
            Some(entry) => return entry.value,
            None => return 0,
        };
        if expired {
            items.pop(key);
        }
        0
    }

    /// Stores `value` under `key` for `ttl`.
    pub fn set_counter(&self, key: &str, value: i64, ttl: Duration) {
        let mut items = self.items.lock();
        Self::prune_if_full(&mut items);
        items.put(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Adds `delta` to the counter at `key` (absent or expired counts as 0)
    /// and refreshes its TTL. Returns the new value.
    pub fn increment_by(&self, key: &str, delta: i64, ttl: Duration) -> i64 {
        let mut items = self.items.lock();
        let current = match items.get(key) {
            Some(entry) if !entry.expired() => entry.value,
            _ => 0,
        };
        let next = current.saturating_add(delta);
        Self::prune_if_full(&mut items);
        items.put(
            key.to_string(),
            CacheEntry {
                value: next,
                expires_at: Instant::now() + ttl,
            },
        );
        next
    }

    pub fn delete(&self, key: &str) {
        self.items.lock().pop(key);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drops up to `count` least-recently-used entries. Used by the memory
    /// guard's forced reclaim cycles.
    pub fn prune(&self, count: usize) -> usize {
        let mut items = self.items.lock();
        let mut dropped = 0;
        for _ in 0..count {
            if items.pop_lru().is_none() {
                break;
            }
            dropped += 1;
        }
        dropped
    }

    fn prune_if_full(items: &mut LruCache<String, CacheEntry>) {
        if items.len() < MAX_ITEMS {
            return;
        }
        for _ in 0..PRUNE_BATCH {
            if items.pop_lru().is_none() {
                break;
            }
        }
    }
}
