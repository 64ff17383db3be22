//! Process-local key/value cache with per-entry TTL and stale-read fallback.
//!
//! Entries are never dropped because they expired: a read past the TTL still
//! returns the last value, flagged stale, so callers can keep showing data
//! while a refresh is retried. `invalidate` forces staleness without losing
//! the fallback value.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    invalidated: bool,
}

impl<V> CacheEntry<V> {
    /// A TTL past the clock's range never expires.
    fn is_expired(&self, now: Instant) -> bool {
        self.invalidated
            || self
                .stored_at
                .checked_add(self.ttl)
                .is_some_and(|expires_at| now >= expires_at)
    }
}

/// Value returned by a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead<V> {
    pub value: V,
    pub is_stale: bool,
}

/// Keyed cache with independent TTLs per key.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for CacheStore<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value, fresh or stale. `None` only if the key was never set.
    pub fn get(&self, key: &K) -> Option<CacheRead<V>> {
        let entry = self.entries.get(key)?;
        let is_stale = entry.is_expired(Instant::now());
        tracing::debug!(key = ?key, is_stale, "cache read");
        Some(CacheRead {
            value: entry.value.clone(),
            is_stale,
        })
    }

    /// Read a value only while it is within its TTL.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        self.get(key)
            .filter(|read| !read.is_stale)
            .map(|read| read.value)
    }

    pub fn set(&mut self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                invalidated: false,
            },
        );
    }

    /// Mark an entry stale so the next read bypasses it. Returns whether it existed.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.get_mut(key).is_some_and(|entry| {
            entry.invalidated = true;
            true
        })
    }

}
