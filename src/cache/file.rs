//! File Store Module
//!
//! Persistent tier: one JSON file per key under the cache directory, with TTL
//! expiry and source-file modification-time validation.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, warn};

use crate::cache::{FileEntry, FileStats};
use crate::clock::{system_time_ms, Clock};
use crate::error::{CacheError, Result};

/// Extension of entry files.
const ENTRY_EXT: &str = "json";

/// Extension of in-flight writes; never read back as an entry.
const TEMP_EXT: &str = "tmp";

/// Distinguishes concurrent writes to the same key within this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// == File Store ==
/// File-backed tier of the cache.
///
/// Entries live at `<dir>/<key>.json`. Reads never delete anything: expired
/// or stale files stay on disk until `sweep_expired` or `clear`.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Cache directory
    dir: PathBuf,
    /// Default TTL in milliseconds
    default_ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    // == Constructor ==
    /// Creates a store rooted at `dir`. Nothing touches the disk until
    /// `init` or the first write.
    pub fn new(dir: impl Into<PathBuf>, default_ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            default_ttl_ms,
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // == Init ==
    /// Creates the cache directory (and parents) if absent.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))
    }

    /// Returns the file path backing `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXT}"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{key}.{}.{n}.{TEMP_EXT}", std::process::id()))
    }

    // == Set ==
    /// Writes `value` under `key`.
    ///
    /// When `source` is given its current modification time is recorded, and
    /// the entry is only served while that file keeps the same mtime. The
    /// payload goes to a temporary file that is then renamed over the entry,
    /// so a failed write leaves any previous entry intact.
    pub async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        source: Option<&Path>,
        ttl_ms: Option<u64>,
    ) -> Result<()> {
        let source_mtime = match source {
            Some(path) => Some(source_mtime(path).await?),
            None => None,
        };

        let entry = FileEntry {
            value: value.clone(),
            stored_at: self.clock.now_ms(),
            ttl: ttl_ms.unwrap_or(self.default_ttl_ms),
            source_mtime,
        };
        let bytes = serde_json::to_vec(&entry)?;

        let path = self.entry_path(key);
        let temp = self.temp_path(key);

        let mut written = fs::write(&temp, &bytes).await;
        if matches!(&written, Err(e) if e.kind() == ErrorKind::NotFound) {
            // Directory not created yet, or removed behind our back
            self.init().await?;
            written = fs::write(&temp, &bytes).await;
        }
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::io(temp, e));
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::io(path, e));
        }

        debug!(key, bytes = bytes.len(), "file entry written");
        Ok(())
    }

    // == Get ==
    /// Reads the value stored for `key`. See `get_entry`.
    pub async fn get(&self, key: &str, source: Option<&Path>) -> Option<serde_json::Value> {
        self.get_entry(key, source).await.map(|entry| entry.value)
    }

    /// Reads the live entry for `key`, with its `storedAt` and TTL.
    ///
    /// Returns `None` when the file is missing or unparsable, when the TTL has
    /// elapsed, or when `source` is given and its mtime no longer matches the
    /// recorded one (including when it can no longer be stat'ed).
    pub async fn get_entry(&self, key: &str, source: Option<&Path>) -> Option<FileEntry> {
        let path = self.entry_path(key);

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "file entry unreadable");
                }
                return None;
            }
        };

        let entry: FileEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file entry unparsable");
                return None;
            }
        };

        if entry.is_expired(self.clock.now_ms()) {
            debug!(key, "file entry expired");
            return None;
        }

        if let Some(source) = source {
            let current = source_mtime(source).await.ok();
            if current.is_none() || current != entry.source_mtime {
                debug!(key, source = %source.display(), "file entry stale");
                return None;
            }
        }

        Some(entry)
    }

    // == Delete ==
    /// Removes the file for `key`. A missing file is not an error.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        remove_if_present(&self.entry_path(key)).await
    }

    // == Clear ==
    /// Removes every file in the cache directory. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for (path, _) in self.list_files().await? {
            if remove_if_present(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // == Sweep Expired ==
    /// Deletes every entry whose TTL has elapsed, plus files that no longer
    /// parse as entries. Source staleness is not considered here.
    ///
    /// A file that cannot be read or removed is logged and skipped; the sweep
    /// carries on with the rest. Only failing to list the directory is an
    /// error. Returns the number of files removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut removed = 0;
        let mut failed = 0;

        for (path, _) in self.list_files().await? {
            if !is_entry_file(&path) {
                continue;
            }

            match sweep_file(&path, now).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "skipping cache file during sweep");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(removed, failed, "sweep finished with unreadable files");
        }
        Ok(removed)
    }

    // == Stats ==
    /// Counts entry files and sums their sizes. A missing directory is empty.
    pub async fn stats(&self) -> Result<FileStats> {
        let mut stats = FileStats::default();
        for (path, meta) in self.list_files().await? {
            if is_entry_file(&path) {
                stats.items += 1;
                stats.total_size += meta.len();
            }
        }
        Ok(stats)
    }

    /// Lists regular files in the cache directory with their metadata.
    async fn list_files(&self) -> Result<Vec<(PathBuf, Metadata)>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            let path = entry.path();
            match entry.metadata().await {
                Ok(meta) if meta.is_file() => files.push((path, meta)),
                Ok(_) => {}
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
        Ok(files)
    }
}

// == Utility Functions ==
/// Current modification time of `path` in Unix milliseconds.
pub async fn source_mtime(path: &Path) -> Result<i64> {
    let unavailable = |source| CacheError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let meta = fs::metadata(path).await.map_err(unavailable)?;
    let modified = meta.modified().map_err(unavailable)?;
    Ok(system_time_ms(modified))
}

/// Removes `path` if it holds an expired or unparsable entry.
async fn sweep_file(path: &Path, now: u64) -> Result<bool> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    let doomed = match serde_json::from_slice::<FileEntry>(&raw) {
        Ok(entry) => entry.is_expired(now),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "sweeping unparsable file entry");
            true
        }
    };

    if doomed {
        remove_if_present(path).await
    } else {
        Ok(false)
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXT)
}

async fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove cache file");
            Err(CacheError::io(path, e))
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::time::{Duration, SystemTime};

    const TTL_MS: u64 = 60_000;

    fn new_store(dir: &Path) -> (Arc<ManualClock>, FileStore) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = FileStore::new(dir.join(".cache"), TTL_MS, clock.clone());
        (clock, store)
    }

    fn touch(path: &Path, mtime: SystemTime) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[tokio::test]
    async fn test_init_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store.init().await.unwrap();

        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store
            .set("k1", &json!({"deps": ["a", "b"]}), None, None)
            .await
            .unwrap();

        assert_eq!(store.get("k1", None).await, Some(json!({"deps": ["a", "b"]})));
        assert!(store.entry_path("k1").is_file());
    }

    #[tokio::test]
    async fn test_persisted_format() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store.set("k1", &json!("data1"), None, Some(5_000)).await.unwrap();

        let raw = std::fs::read_to_string(store.entry_path("k1")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["value"], json!("data1"));
        assert_eq!(parsed["storedAt"], json!(1_700_000_000_000u64));
        assert_eq!(parsed["ttl"], json!(5_000));
        assert!(parsed.get("sourceMtime").is_none());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        assert_eq!(store.get("missing", None).await, None);
    }

    #[tokio::test]
    async fn test_get_unparsable_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());
        store.init().await.unwrap();

        std::fs::write(store.entry_path("bad"), b"{ not json").unwrap();

        assert_eq!(store.get("bad", None).await, None);
    }

    #[tokio::test]
    async fn test_get_expired_is_none_but_file_stays() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, store) = new_store(tmp.path());

        store.set("k1", &json!(1), None, None).await.unwrap();

        clock.advance(Duration::from_millis(TTL_MS));
        assert_eq!(store.get("k1", None).await, Some(json!(1)));

        clock.advance(Duration::from_millis(1));
        assert_eq!(store.get("k1", None).await, None);
        assert!(store.entry_path("k1").exists());
    }

    #[tokio::test]
    async fn test_source_mtime_change_invalidates() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());
        let source = tmp.path().join("main.ts");
        std::fs::write(&source, "export {}").unwrap();
        let original = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        touch(&source, original);

        store
            .set("k1", &json!("parsed"), Some(&source), None)
            .await
            .unwrap();
        assert_eq!(store.get("k1", Some(&source)).await, Some(json!("parsed")));

        touch(&source, original + Duration::from_secs(5));
        assert_eq!(store.get("k1", Some(&source)).await, None);

        // Reverting the source makes the entry valid again
        touch(&source, original);
        assert_eq!(store.get("k1", Some(&source)).await, Some(json!("parsed")));
    }

    #[tokio::test]
    async fn test_missing_source_on_read_is_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());
        let source = tmp.path().join("gone.ts");
        std::fs::write(&source, "x").unwrap();

        store.set("k1", &json!(1), Some(&source), None).await.unwrap();
        std::fs::remove_file(&source).unwrap();

        assert_eq!(store.get("k1", Some(&source)).await, None);
        // Without a source the entry is still served
        assert_eq!(store.get("k1", None).await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_set_with_missing_source_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        let result = store
            .set("k1", &json!(1), Some(&tmp.path().join("nope.ts")), None)
            .await;

        assert!(matches!(result, Err(CacheError::SourceUnavailable { .. })));
        assert!(!store.entry_path("k1").exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store.set("k1", &json!("old"), None, None).await.unwrap();
        let result = store
            .set("k1", &json!("new"), Some(&tmp.path().join("nope.ts")), None)
            .await;

        assert!(result.is_err());
        assert_eq!(store.get("k1", None).await, Some(json!("old")));
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        for i in 0..5 {
            store.set("k1", &json!(i), None, None).await.unwrap();
        }

        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(store.get("k1", None).await, Some(json!(4)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store.set("k1", &json!(1), None, None).await.unwrap();

        assert!(store.delete("k1").await.unwrap());
        assert!(!store.delete("k1").await.unwrap());
        assert_eq!(store.get("k1", None).await, None);
    }

    #[tokio::test]
    async fn test_clear_removes_all_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store.set("k1", &json!(1), None, None).await.unwrap();
        store.set("k2", &json!(2), None, None).await.unwrap();
        std::fs::write(store.dir().join(".k3.1.1.tmp"), b"partial").unwrap();

        assert_eq!(store.clear().await.unwrap(), 3);
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_clear_without_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, store) = new_store(tmp.path());

        store.set("short", &json!(1), None, Some(1_000)).await.unwrap();
        store.set("long", &json!(2), None, None).await.unwrap();

        clock.advance(Duration::from_millis(1_001));

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(!store.entry_path("short").exists());
        assert!(store.entry_path("long").exists());
    }

    #[tokio::test]
    async fn test_sweep_ignores_staleness() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());
        let source = tmp.path().join("lib.ts");
        std::fs::write(&source, "x").unwrap();
        let original = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        touch(&source, original);

        store.set("k1", &json!(1), Some(&source), None).await.unwrap();
        touch(&source, original + Duration::from_secs(60));

        assert_eq!(store.sweep_expired().await.unwrap(), 0);
        assert!(store.entry_path("k1").exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_unparsable_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());
        store.init().await.unwrap();

        std::fs::write(store.entry_path("bad"), b"garbage").unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(!store.entry_path("bad").exists());
    }

    #[tokio::test]
    async fn test_get_entry_keeps_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, store) = new_store(tmp.path());

        store.set("k1", &json!("v"), None, Some(500)).await.unwrap();
        clock.advance(Duration::from_millis(200));

        let entry = store.get_entry("k1", None).await.unwrap();
        assert_eq!(entry.stored_at, 1_700_000_000_000);
        assert_eq!(entry.ttl, 500);
        assert_eq!(entry.ttl_remaining_ms(clock.now_ms()), 300);
    }

    #[tokio::test]
    async fn test_set_recreates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        store.init().await.unwrap();
        std::fs::remove_dir(store.dir()).unwrap();

        store.set("k1", &json!(1), None, None).await.unwrap();
        assert_eq!(store.get("k1", None).await, Some(json!(1)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sweep_skips_unreadable_file_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let (clock, store) = new_store(tmp.path());

        store.set("locked", &json!(1), None, Some(10)).await.unwrap();
        store.set("open", &json!(2), None, Some(10)).await.unwrap();
        let locked = store.entry_path("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read(&locked).is_ok() {
            // Running with privileges that ignore file modes
            return;
        }

        clock.advance(Duration::from_millis(11));

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(locked.exists());
        assert!(!store.entry_path("open").exists());
    }

    #[tokio::test]
    async fn test_stats_counts_entry_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = new_store(tmp.path());

        assert_eq!(store.stats().await.unwrap(), FileStats::default());

        store.set("k1", &json!("data1"), None, None).await.unwrap();
        store.set("k2", &json!("data2"), None, None).await.unwrap();
        std::fs::write(store.dir().join(".k3.1.1.tmp"), b"partial").unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.items, 2);
        let expected: u64 = ["k1", "k2"]
            .iter()
            .map(|k| std::fs::metadata(store.entry_path(k)).unwrap().len())
            .sum();
        assert_eq!(stats.total_size, expected);
    }
}
