//! Memory Store Module
//!
//! Bounded in-process tier: HashMap storage, lazy TTL expiry on read and
//! insertion-order eviction.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheEntry, InsertionOrder, MemoryStats};
use crate::clock::Clock;

/// Stale order slots tolerated before the queue is compacted.
const COMPACT_SLACK: usize = 64;

// == Memory Store ==
/// In-memory tier of the cache.
///
/// Not internally synchronized; `TieredCache` keeps it behind a lock so every
/// call runs as one atomic step.
#[derive(Debug)]
pub struct MemoryStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order for eviction
    order: InsertionOrder,
    /// Hit/miss/eviction counters
    stats: MemoryStats,
    /// Maximum number of entries, `None` = unbounded
    max_items: Option<usize>,
    /// Default TTL in milliseconds
    default_ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> MemoryStore<V> {
    // == Constructor ==
    /// Creates a new MemoryStore with optional capacity and a default TTL.
    ///
    /// # Arguments
    /// * `max_items` - Capacity; `None` never evicts
    /// * `default_ttl_ms` - TTL in milliseconds for entries set without one
    /// * `clock` - Time source for `storedAt` and expiry checks
    pub fn new(max_items: Option<usize>, default_ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            order: InsertionOrder::new(),
            stats: MemoryStats::default(),
            max_items,
            default_ttl_ms,
            clock,
        }
    }

    // == Set ==
    /// Stores a value under `key` with the default TTL.
    pub fn set(&mut self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.default_ttl_ms);
    }

    /// Stores a value under `key` with an explicit TTL in milliseconds.
    ///
    /// Overwriting refreshes value and `storedAt` but keeps the key's original
    /// eviction position. If the store is then over capacity, the oldest
    /// inserted entries are evicted.
    pub fn set_with_ttl(&mut self, key: &str, value: V, ttl_ms: u64) {
        let now = self.clock.now_ms();

        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = value;
            entry.stored_at = now;
            entry.ttl_ms = ttl_ms;
            return;
        }

        let seq = self.order.push(key);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
                ttl_ms,
                seq,
            },
        );

        self.evict_over_capacity();
    }

    // == Get ==
    /// Returns the value if present and not expired.
    ///
    /// An expired entry is removed on the spot; there is no background timer
    /// for this tier.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.record_hit();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
            self.stats.record_expiration();
            self.maybe_compact();
            debug!(key, "memory entry expired on read");
        }
        self.stats.record_miss();
        None
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether something was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.maybe_compact();
        }
        removed
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));

        let removed = before - self.entries.len();
        if removed > 0 {
            self.stats.expirations += removed as u64;
            self.maybe_compact();
        }
        removed
    }

    /// TTL applied by `set`.
    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    // == Stats ==
    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    // == Length ==
    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_over_capacity(&mut self) {
        let Some(max_items) = self.max_items else {
            return;
        };

        while self.entries.len() > max_items {
            let Some((key, seq)) = self.order.pop_oldest() else {
                break;
            };
            let live = self.entries.get(&key).is_some_and(|e| e.seq == seq);
            if live {
                self.entries.remove(&key);
                self.stats.record_eviction();
                debug!(key = %key, "memory entry evicted for capacity");
            }
        }
    }

    fn maybe_compact(&mut self) {
        if self.order.len() > self.entries.len() * 2 + COMPACT_SLACK {
            let entries = &self.entries;
            self.order
                .compact(|key, seq| entries.get(key).is_some_and(|e| e.seq == seq));
        }
    }
}
