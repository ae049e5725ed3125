//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and tier sizes.

use serde::Serialize;

// == Memory Stats ==
/// Counters kept by the memory tier, mutated under its lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Reads served from memory
    pub hits: u64,
    /// Reads that found nothing live in memory
    pub misses: u64,
    /// Entries dropped because capacity was exceeded
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

impl MemoryStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }
}

// == File Stats ==
/// Size of the file tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Entry files in the cache directory
    pub items: usize,
    /// Sum of entry file sizes in bytes
    pub total_size: u64,
}

// == Cache Stats ==
/// Snapshot returned by `TieredCache::get_stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries currently held in memory
    pub memory_items: usize,
    /// Entry files in the cache directory
    pub file_items: usize,
    /// Sum of entry file sizes in bytes
    pub total_size: u64,
    /// Reads answered by the memory tier
    pub memory_hits: u64,
    /// Reads answered by the file tier (and backfilled)
    pub file_hits: u64,
    /// Reads answered by neither tier
    pub misses: u64,
    /// Memory entries evicted for capacity
    pub evictions: u64,
    /// Memory entries removed on read because they had expired
    pub expirations: u64,
    /// File-tier writes that failed while the memory write succeeded
    pub file_write_errors: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the overall hit rate across both tiers.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.file_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
