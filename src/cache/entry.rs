//! Cache Entry Module
//!
//! Defines the stored unit of each tier with its TTL metadata.

use serde::{Deserialize, Serialize};

// == Expiry Rule ==
/// An entry is expired once strictly more than `ttl_ms` has elapsed since it
/// was stored. A clock that went backwards counts as zero elapsed time.
pub fn is_expired_at(stored_at: u64, ttl_ms: u64, now: u64) -> bool {
    now.saturating_sub(stored_at) > ttl_ms
}

// == Cache Entry ==
/// In-memory entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Lifetime in milliseconds
    pub ttl_ms: u64,
    /// Insertion sequence number, kept across overwrites
    pub(crate) seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired_at(self.stored_at, self.ttl_ms, now)
    }

    /// Remaining lifetime in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.stored_at.saturating_add(self.ttl_ms).saturating_sub(now)
    }
}

// == File Entry ==
/// On-disk form of an entry, one JSON object per cache file:
/// `{ "value": .., "storedAt": .., "ttl": .., "sourceMtime": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub value: serde_json::Value,
    pub stored_at: u64,
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mtime: Option<i64>,
}

impl FileEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired_at(self.stored_at, self.ttl, now)
    }

    /// Remaining lifetime in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.stored_at.saturating_add(self.ttl).saturating_sub(now)
    }
}
