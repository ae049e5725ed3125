//! Cache Module
//!
//! Two-tier result cache: a bounded in-memory store in front of a persistent
//! file store, keyed by a digest of `(namespace, params)`.

mod entry;
mod file;
mod key;
mod memory;
mod order;
mod stats;
mod tiered;


// Re-export public types
pub use entry::{is_expired_at, CacheEntry, FileEntry};
pub use file::{source_mtime, FileStore};
pub use key::{generate_key, CacheKey};
pub use memory::MemoryStore;
pub use order::InsertionOrder;
pub use stats::{CacheStats, FileStats, MemoryStats};
pub use tiered::TieredCache;
