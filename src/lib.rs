//! Tiered Cache - A two-tier result cache for build pipelines
//!
//! Memoizes results derived from source files in a bounded in-memory store
//! backed by a persistent file store, with TTL expiry and source-file
//! staleness detection.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{generate_key, CacheKey, CacheStats, TieredCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
