//! Tiered Cache Module
//!
//! Public facade composing the memory and file stores into one
//! read-through/write-through cache.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{generate_key, CacheKey, CacheStats, FileStats, FileStore, MemoryStore};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;

// == Tier Counters ==
/// Facade-level counters; the memory store keeps its own.
#[derive(Debug, Default)]
struct TierCounters {
    file_hits: AtomicU64,
    misses: AtomicU64,
    file_write_errors: AtomicU64,
}

// == Tiered Cache ==
/// Two-tier cache handle.
///
/// Cloning is cheap and every clone shares the same stores, so one instance
/// can be handed to tasks (see `spawn_sweep_task`). Separate instances share
/// nothing but whatever directory they point at.
#[derive(Debug, Clone)]
pub struct TieredCache {
    config: Arc<CacheConfig>,
    enabled: Arc<AtomicBool>,
    /// Memory tier, locked for the duration of each synchronous store call
    memory: Arc<RwLock<MemoryStore<Value>>>,
    /// File tier
    files: FileStore,
    counters: Arc<TierCounters>,
    clock: Arc<dyn Clock>,
}

impl TieredCache {
    // == Initialize ==
    /// Builds a cache rooted at `<base_dir>/<config.directory>` and creates
    /// that directory.
    ///
    /// Fails if the directory cannot be created. A disabled cache does not
    /// touch the disk here.
    pub async fn initialize(config: CacheConfig, base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::initialize_with_clock(config, base_dir, Arc::new(SystemClock)).await
    }

    /// Same as `initialize`, with an explicit time source.
    pub async fn initialize_with_clock(
        config: CacheConfig,
        base_dir: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dir = base_dir.as_ref().join(&config.directory);
        let files = FileStore::new(dir, config.ttl_ms, clock.clone());
        let memory = MemoryStore::new(config.max_memory_items, config.memory_ttl(), clock.clone());

        if config.enabled {
            files.init().await?;
            info!(dir = %files.dir().display(), "cache initialized");
        } else {
            info!("cache disabled");
        }

        Ok(Self {
            enabled: Arc::new(AtomicBool::new(config.enabled)),
            config: Arc::new(config),
            memory: Arc::new(RwLock::new(memory)),
            files,
            counters: Arc::new(TierCounters::default()),
            clock,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Directory holding the file tier.
    pub fn cache_dir(&self) -> &Path {
        self.files.dir()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flips the global switch. While disabled, reads miss and writes are
    /// dropped without touching either tier.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    // == Get ==
    /// Looks up the value cached for `namespace` (and `source`, if any).
    ///
    /// Memory is consulted first. On a memory miss the file tier is read,
    /// rejecting entries whose source file changed, and a hit is copied back
    /// into memory. A stored value that does not deserialize into `T` is a miss.
    pub async fn get<T>(&self, namespace: &str, source: Option<&Path>) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.get_with_params(namespace, &(), source).await
    }

    /// `get` for results that also depend on `params`.
    pub async fn get_with_params<T, P>(
        &self,
        namespace: &str,
        params: &P,
        source: Option<&Path>,
    ) -> Option<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        if !self.is_enabled() {
            return None;
        }

        let key = match key_for(namespace, params, source) {
            Ok(key) => key,
            Err(e) => {
                debug!(namespace, error = %e, "cache key unavailable");
                return None;
            }
        };

        let value = self.lookup(&key, source).await?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(namespace, key = %key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    async fn lookup(&self, key: &CacheKey, source: Option<&Path>) -> Option<Value> {
        let hit = self.memory.write().await.get(key.as_str());
        if let Some(value) = hit {
            debug!(key = %key, "memory hit");
            return Some(value);
        }

        match self.files.get_entry(key.as_str(), source).await {
            Some(entry) => {
                // The copy must not outlive the file entry it came from
                let remaining = entry.ttl_remaining_ms(self.clock.now_ms());
                {
                    let mut memory = self.memory.write().await;
                    let ttl_ms = remaining.min(memory.default_ttl_ms());
                    memory.set_with_ttl(key.as_str(), entry.value.clone(), ttl_ms);
                }
                self.counters.file_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl_ms = remaining, "file hit, backfilled memory");
                Some(entry.value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` for `namespace` (and `source`, if any) in both tiers.
    ///
    /// Only a value that cannot be serialized is an error. A file-tier failure
    /// is logged and counted in `CacheStats::file_write_errors`; the value is
    /// still served from memory.
    pub async fn set<T>(&self, namespace: &str, value: &T, source: Option<&Path>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.store(namespace, &(), value, source, None).await
    }

    /// `set` with a TTL overriding the configured ones for this entry.
    pub async fn set_with_ttl<T>(
        &self,
        namespace: &str,
        value: &T,
        source: Option<&Path>,
        ttl: Duration,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ttl_ms = ttl.as_millis().min(u64::MAX as u128) as u64;
        self.store(namespace, &(), value, source, Some(ttl_ms)).await
    }

    /// `set` for results that also depend on `params`.
    pub async fn set_with_params<T, P>(
        &self,
        namespace: &str,
        params: &P,
        value: &T,
        source: Option<&Path>,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        self.store(namespace, params, value, source, None).await
    }

    async fn store<T, P>(
        &self,
        namespace: &str,
        params: &P,
        value: &T,
        source: Option<&Path>,
        ttl_ms: Option<u64>,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        if !self.is_enabled() {
            return Ok(());
        }

        let key = key_for(namespace, params, source)?;
        let value = serde_json::to_value(value)?;

        {
            let mut memory = self.memory.write().await;
            match ttl_ms {
                Some(ttl_ms) => memory.set_with_ttl(key.as_str(), value.clone(), ttl_ms),
                None => memory.set(key.as_str(), value.clone()),
            }
        }

        if let Err(e) = self.files.set(key.as_str(), &value, source, ttl_ms).await {
            self.counters
                .file_write_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(namespace, key = %key, error = %e, "file tier write failed");
        }

        Ok(())
    }

    // == Delete ==
    /// Removes the entry for `namespace` (and `source`) from both tiers.
    pub async fn delete(&self, namespace: &str, source: Option<&Path>) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let key = key_for(namespace, &(), source)?;
        self.memory.write().await.delete(key.as_str());
        self.files.delete(key.as_str()).await?;
        Ok(())
    }

    // == Clear ==
    /// Empties memory and removes every file in the cache directory.
    pub async fn clear(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.memory.write().await.clear();
        let removed = self.files.clear().await?;
        info!(files_removed = removed, "cache cleared");
        Ok(())
    }

    // == Clean Expired Cache ==
    /// Deletes expired file entries. Memory entries expire lazily on read.
    ///
    /// Returns the number of files removed.
    pub async fn clean_expired_cache(&self) -> Result<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let removed = self.files.sweep_expired().await?;
        if removed > 0 {
            info!(files_removed = removed, "expired cache entries swept");
        }
        Ok(removed)
    }

    // == Stats ==
    /// Returns tier sizes and hit/miss counters.
    ///
    /// While disabled the cache directory is not read and the file tier
    /// reports as empty.
    pub async fn get_stats(&self) -> Result<CacheStats> {
        let (memory_items, memory_stats) = {
            let memory = self.memory.read().await;
            (memory.len(), memory.stats())
        };
        let file_stats = if self.is_enabled() {
            self.files.stats().await?
        } else {
            FileStats::default()
        };

        Ok(CacheStats {
            memory_items,
            file_items: file_stats.items,
            total_size: file_stats.total_size,
            memory_hits: memory_stats.hits,
            file_hits: self.counters.file_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: memory_stats.evictions,
            expirations: memory_stats.expirations,
            file_write_errors: self.counters.file_write_errors.load(Ordering::Relaxed),
        })
    }
}

/// Key for a facade entry: `params` plus the source path as `filePath`.
fn key_for<P>(namespace: &str, params: &P, source: Option<&Path>) -> Result<CacheKey>
where
    P: Serialize + ?Sized,
{
    let file_path = source.map(|p| p.to_string_lossy().into_owned());
    let params = serde_json::to_value(params)?;
    let key_params = if params.is_null() {
        json!({ "filePath": file_path })
    } else {
        json!({ "filePath": file_path, "params": params })
    };
    generate_key(namespace, &key_params)
}
