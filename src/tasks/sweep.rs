//! Expired Sweep Task
//!
//! Background task that periodically removes expired file-tier entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::TieredCache;

/// Spawns a background task that periodically sweeps expired cache files.
///
/// The task runs in an infinite loop, sleeping for `interval` between calls
/// to `TieredCache::clean_expired_cache`. A failed sweep is logged and the
/// loop carries on. Memory entries are not touched; they expire on read.
///
/// # Returns
/// A JoinHandle for the spawned task; abort it to stop sweeping.
///
/// # Example
/// ```ignore
/// let cache = TieredCache::initialize(CacheConfig::default(), ".").await?;
/// let sweeper = spawn_sweep_task(cache.clone(), cache.config().sweep_interval());
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweep_task(cache: TieredCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expired-entry sweep task with interval of {:?}",
            interval
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.clean_expired_cache().await {
                Ok(0) => debug!("Sweep: no expired entries found"),
                Ok(removed) => info!("Sweep: removed {} expired entries", removed),
                Err(e) => warn!(error = %e, "Sweep failed"),
            }
        }
    })
}
