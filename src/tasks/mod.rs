//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Expired sweep: deletes file-tier entries whose TTL has elapsed

mod sweep;

pub use sweep::spawn_sweep_task;
