//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Global switch; when false every operation is a no-op miss
    pub enabled: bool,
    /// Default TTL in milliseconds for the file tier (and memory tier unless overridden)
    pub ttl_ms: u64,
    /// Memory tier TTL in milliseconds, `None` = same as `ttl_ms`
    pub memory_ttl_ms: Option<u64>,
    /// Cache root, relative to the base directory given at initialization
    pub directory: PathBuf,
    /// Maximum number of in-memory entries, `None` = unbounded
    pub max_memory_items: Option<usize>,
    /// Interval in seconds between background sweeps of expired files
    pub sweep_interval_secs: u64,
}

const DEFAULT_TTL_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_DIRECTORY: &str = ".cache";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENABLED` - `true`/`false`/`1`/`0` (default: true)
    /// - `CACHE_TTL_MS` - Default TTL in milliseconds (default: 24h)
    /// - `CACHE_MEMORY_TTL_MS` - Memory tier TTL in milliseconds (default: unset)
    /// - `CACHE_DIR` - Cache directory under the base dir (default: `.cache`)
    /// - `CACHE_MAX_MEMORY_ITEMS` - Memory tier capacity (default: unbounded)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Sweep frequency in seconds (default: 300)
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("CACHE_ENABLED")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            ttl_ms: env::var("CACHE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TTL_MS),
            memory_ttl_ms: env::var("CACHE_MEMORY_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            directory: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY)),
            max_memory_items: env::var("CACHE_MAX_MEMORY_ITEMS")
                .ok()
                .and_then(|v| v.parse().ok()),
            sweep_interval_secs: env::var("CACHE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }

    /// Effective TTL of the memory tier.
    pub fn memory_ttl(&self) -> u64 {
        self.memory_ttl_ms.unwrap_or(self.ttl_ms)
    }

    /// Interval for `spawn_sweep_task`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_memory_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.memory_ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_max_memory_items(mut self, max: usize) -> Self {
        self.max_memory_items = Some(max);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: DEFAULT_TTL_MS,
            memory_ttl_ms: None,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            max_memory_items: None,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
