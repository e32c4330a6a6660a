//! Durable, compressed cache of fetched payloads.
//!
//! [`CompressedCache`] maps a source identifier (URL or query) to the payload
//! last fetched for it. Lookups go through three tiers:
//!
//! 1. an in-memory hot layer ([`LruTtlCache`]),
//! 2. the gzip entry file `<dir>/<key>.json.gz`,
//! 3. a legacy uncompressed file `<dir>/<key>.json`, migrated on first read.
//!
//! Every tier honours the configured TTL, measured from the entry's write
//! time. Writes are atomic and every payload exposing records is registered
//! in the [`CacheIndex`].
//!
//! Storage problems never escape [`CompressedCache::get`]: an unreadable or
//! corrupt entry is reported as a miss and left for
//! [`CompressedCache::sweep_expired`] to delete.

pub(crate) mod codec;
pub(crate) mod entry;
mod key;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use entry::{COMPRESSED_EXT, CacheEntry, LEGACY_EXT};
pub use key::{CacheKey, KEY_PREFIX, normalize_source};

use crate::clock::{Clock, system_clock};
use crate::config::CacheConfig;
use crate::index::{self, CacheIndex, IndexEntry, SNAPSHOT_FILE};
use crate::lru::{LruStats, LruTtlCache};
use crate::payload::Payload;
use crate::{Error, Result};
use entry::{LoadedEntry, read_entry_file, write_atomic};

/// Counters describing cache traffic since the cache was opened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups answered by the hot layer.
    pub hot_hits: u64,
    /// Lookups answered from a compressed entry file.
    pub disk_hits: u64,
    /// Lookups answered by migrating a legacy file.
    pub legacy_migrations: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Successful writes.
    pub writes: u64,
    /// Writes that could not be serialized or stored.
    pub write_failures: u64,
    /// Entry files deleted because they were stale.
    pub expired_removed: u64,
    /// Uncompressed minus compressed bytes, summed over writes.
    pub bytes_saved: u64,
    /// Running mean of `compressed / raw` over writes.
    pub avg_compression_ratio: f64,
    /// Hot-layer statistics.
    pub hot: LruStats,
}

/// Outcome of [`CompressedCache::sweep_expired`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Entry files examined.
    pub scanned: usize,
    /// Files deleted because they outlived the TTL.
    pub expired: usize,
    /// Files deleted because they could not be decoded.
    pub corrupt: usize,
    /// Files that could not be deleted.
    pub failed: usize,
    /// Bytes released on disk.
    pub bytes_freed: u64,
}

impl SweepReport {
    /// Total files removed.
    pub const fn removed(&self) -> usize {
        self.expired + self.corrupt
    }
}

#[derive(Default)]
struct Counters {
    hot_hits: u64,
    disk_hits: u64,
    legacy_migrations: u64,
    misses: u64,
    writes: u64,
    write_failures: u64,
    expired_removed: u64,
    bytes_saved: u64,
    avg_ratio: f64,
}

enum Probe<P> {
    Fresh(LoadedEntry<P>),
    Stale,
    Missing,
    Unreadable(Error),
}

/// Compressed, indexed, TTL-bounded store of payloads of type `P`.
pub struct CompressedCache<P: Payload> {
    config: CacheConfig,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    hot: LruTtlCache<CacheKey, CacheEntry<P>>,
    index: Arc<CacheIndex>,
    counters: Mutex<Counters>,
}

impl<P: Payload> CompressedCache<P> {
    /// Open a cache in `config.dir` using the system clock.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with_clock(config, system_clock()).await
    }

    /// Open a cache reading time from `clock`.
    ///
    /// Creates the directory if needed and loads the index snapshot. The index
    /// is rebuilt from the entry files when the snapshot is corrupt, when it is
    /// missing while entries exist, or when it references files that are gone.
    pub async fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.dir).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to create cache directory {}: {e}",
                config.dir.display()
            ))
        })?;

        let snapshot_path = config.dir.join(SNAPSHOT_FILE);
        let snapshot_existed = tokio::fs::try_exists(&snapshot_path).await.unwrap_or(false);
        let index = CacheIndex::open(snapshot_path).await;

        let reason = if index.needs_rebuild() {
            Some("snapshot unusable")
        } else if !snapshot_existed && !index::list_entry_files(&config.dir).await?.is_empty() {
            Some("snapshot missing")
        } else if index.entries().iter().any(|e| !e.path.exists()) {
            Some("snapshot references missing files")
        } else {
            None
        };
        if let Some(reason) = reason {
            info!(dir = %config.dir.display(), reason, "Rebuilding cache index");
            if let Err(e) = index.rebuild::<P>(&config.dir).await {
                warn!(dir = %config.dir.display(), "Index rebuild failed: {e}");
            }
        }

        let ttl_std = config.ttl();
        let ttl = TimeDelta::from_std(ttl_std)
            .map_err(|e| Error::Config(format!("cache TTL out of range: {e}")))?;
        let hot = LruTtlCache::with_clock(config.hot_entries, ttl_std, Arc::clone(&clock));

        debug!(dir = %config.dir.display(), entries = index.len(), "Opened compressed cache");
        Ok(Self {
            config,
            ttl,
            clock,
            hot,
            index: Arc::new(index),
            counters: Mutex::new(Counters::default()),
        })
    }

    /// Configuration the cache was opened with.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// The search index maintained alongside the entries.
    pub const fn index(&self) -> &Arc<CacheIndex> {
        &self.index
    }

    fn paths(&self, key: &CacheKey) -> (PathBuf, PathBuf) {
        (
            self.config.dir.join(format!("{key}.{COMPRESSED_EXT}")),
            self.config.dir.join(format!("{key}.{LEGACY_EXT}")),
        )
    }

    async fn probe(&self, path: &Path, compressed: bool, now: DateTime<Utc>) -> Probe<P> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Probe::Missing;
        }
        match read_entry_file::<P>(path, compressed).await {
            Ok(loaded) if loaded.entry.is_expired(now, self.ttl) => Probe::Stale,
            Ok(loaded) => Probe::Fresh(loaded),
            Err(e) => Probe::Unreadable(e),
        }
    }

    /// Look up the payload cached for `source_id`.
    ///
    /// Returns `None` on a miss, for stale entries (which are deleted) and for
    /// entries that cannot be read.
    pub async fn get(&self, source_id: &str) -> Option<P> {
        let key = CacheKey::from_source(source_id);
        let now = self.clock.now();

        if let Some(entry) = self.hot.get(&key) {
            if !entry.is_expired(now, self.ttl) {
                self.counters.lock().hot_hits += 1;
                return Some(entry.payload);
            }
            self.hot.delete(&key);
        }

        let (compressed_path, legacy_path) = self.paths(&key);

        match self.probe(&compressed_path, true, now).await {
            Probe::Fresh(loaded) => {
                debug!(%key, "Disk cache hit");
                self.counters.lock().disk_hits += 1;
                let payload = loaded.entry.payload.clone();
                self.hot.set(key, loaded.entry);
                return Some(payload);
            },
            Probe::Stale => {
                debug!(%key, "Cache entry expired");
                self.discard_file(&compressed_path).await;
                self.counters.lock().expired_removed += 1;
                self.index.remove_entry(&key).await;
                self.counters.lock().misses += 1;
                return None;
            },
            Probe::Unreadable(e) => {
                warn!(%key, path = %compressed_path.display(), "Treating unreadable cache entry as a miss: {e}");
                self.counters.lock().misses += 1;
                return None;
            },
            Probe::Missing => {},
        }

        match self.probe(&legacy_path, false, now).await {
            Probe::Fresh(loaded) => {
                let payload = loaded.entry.payload.clone();
                match self.migrate(loaded, &compressed_path, &legacy_path).await {
                    Ok(()) => {
                        info!(%key, "Migrated legacy cache entry");
                        self.counters.lock().legacy_migrations += 1;
                    },
                    Err(e) => {
                        warn!(%key, "Failed to migrate legacy cache entry: {e}");
                        self.counters.lock().disk_hits += 1;
                    },
                }
                Some(payload)
            },
            Probe::Stale => {
                debug!(%key, "Legacy cache entry expired");
                self.discard_file(&legacy_path).await;
                self.counters.lock().expired_removed += 1;
                self.index.remove_entry(&key).await;
                self.counters.lock().misses += 1;
                None
            },
            Probe::Unreadable(e) => {
                warn!(%key, path = %legacy_path.display(), "Treating unreadable legacy entry as a miss: {e}");
                self.counters.lock().misses += 1;
                None
            },
            Probe::Missing => {
                self.counters.lock().misses += 1;
                None
            },
        }
    }

    async fn migrate(
        &self,
        loaded: LoadedEntry<P>,
        compressed_path: &Path,
        legacy_path: &Path,
    ) -> Result<()> {
        let raw = loaded.entry.encode()?;
        let packed = codec::compress(&raw, self.config.compression_level)?;
        write_atomic(compressed_path, &packed).await?;
        self.discard_file(legacy_path).await;

        let entry = loaded.entry;
        self.register(&entry, compressed_path, raw.len() as u64, packed.len() as u64)
            .await;
        self.hot.set(entry.key.clone(), entry);
        Ok(())
    }

    /// Store `payload` for `source_id`, replacing any previous entry.
    ///
    /// The hot layer and the index are only updated once the compressed file
    /// is durably written. On error the entry stays absent.
    pub async fn set(&self, source_id: &str, payload: P) -> Result<()> {
        let entry = CacheEntry::new(source_id, payload, self.clock.now());
        let key = entry.key.clone();
        let (compressed_path, legacy_path) = self.paths(&key);

        let written = async {
            let raw = entry.encode()?;
            let packed = codec::compress(&raw, self.config.compression_level)?;
            write_atomic(&compressed_path, &packed).await?;
            Ok::<_, Error>((raw.len() as u64, packed.len() as u64))
        }
        .await;

        let (raw_size, stored_size) = match written {
            Ok(sizes) => sizes,
            Err(e) => {
                warn!(%key, category = e.category(), "Failed to write cache entry: {e}");
                self.counters.lock().write_failures += 1;
                return Err(e);
            },
        };

        if tokio::fs::try_exists(&legacy_path).await.unwrap_or(false) {
            self.discard_file(&legacy_path).await;
        }
        self.record_write(raw_size, stored_size);
        self.register(&entry, &compressed_path, raw_size, stored_size)
            .await;
        debug!(%key, raw_size, stored_size, "Cached entry");
        self.hot.set(key, entry);
        Ok(())
    }

    fn record_write(&self, raw_size: u64, stored_size: u64) {
        let mut counters = self.counters.lock();
        counters.writes += 1;
        counters.bytes_saved += raw_size.saturating_sub(stored_size);
        #[allow(clippy::cast_precision_loss)]
        let ratio = if raw_size == 0 {
            1.0
        } else {
            stored_size as f64 / raw_size as f64
        };
        #[allow(clippy::cast_precision_loss)]
        let n = counters.writes as f64;
        counters.avg_ratio += (ratio - counters.avg_ratio) / n;
    }

    async fn register(&self, entry: &CacheEntry<P>, path: &Path, raw_size: u64, stored_size: u64) {
        match entry.payload.metadata() {
            Some(metadata) => {
                self.index
                    .add_entry(IndexEntry::new(
                        entry.key.clone(),
                        path.to_path_buf(),
                        entry.source_id.clone(),
                        entry.written_at,
                        metadata,
                        raw_size,
                        stored_size,
                    ))
                    .await;
            },
            None => {
                self.index.remove_entry(&entry.key).await;
            },
        }
    }

    /// Whether a fresh entry exists for `source_id`. Does not promote.
    pub async fn contains(&self, source_id: &str) -> bool {
        let key = CacheKey::from_source(source_id);
        let now = self.clock.now();
        if self
            .hot
            .peek(&key)
            .is_some_and(|entry| !entry.is_expired(now, self.ttl))
        {
            return true;
        }
        let (compressed_path, legacy_path) = self.paths(&key);
        for (path, compressed) in [(compressed_path, true), (legacy_path, false)] {
            if matches!(self.probe(&path, compressed, now).await, Probe::Fresh(_)) {
                return true;
            }
        }
        false
    }

    /// Remove the entry for `source_id` from every tier and the index.
    ///
    /// Returns `true` if anything was removed.
    pub async fn delete(&self, source_id: &str) -> bool {
        let key = CacheKey::from_source(source_id);
        let mut removed = self.hot.delete(&key).is_some();
        let (compressed_path, legacy_path) = self.paths(&key);
        for path in [compressed_path, legacy_path] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => warn!(%key, path = %path.display(), "Failed to delete cache file: {e}"),
            }
        }
        removed |= self.index.remove_entry(&key).await;
        if removed {
            debug!(%key, "Deleted cache entry");
        }
        removed
    }

    /// Delete every entry file that is stale or cannot be decoded.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for file in index::list_entry_files(&self.config.dir).await? {
            report.scanned += 1;
            let size = tokio::fs::metadata(&file.path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);

            let corrupt = match read_entry_file::<P>(&file.path, file.compressed).await {
                Ok(loaded) if loaded.entry.is_expired(now, self.ttl) => false,
                Ok(_) => continue,
                Err(e) => {
                    warn!(key = %file.key, path = %file.path.display(), "Deleting corrupt cache entry: {e}");
                    true
                },
            };

            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %file.path.display(), "Failed to delete cache file: {e}");
                    report.failed += 1;
                    continue;
                }
            }
            report.bytes_freed += size;
            if corrupt {
                report.corrupt += 1;
            } else {
                report.expired += 1;
            }

            let (compressed_path, legacy_path) = self.paths(&file.key);
            let other = if file.compressed { legacy_path } else { compressed_path };
            if !tokio::fs::try_exists(&other).await.unwrap_or(false) {
                self.hot.delete(&file.key);
                self.index.remove_entry(&file.key).await;
            }
        }

        self.hot.cleanup_expired();
        self.counters.lock().expired_removed += report.expired as u64;
        info!(
            scanned = report.scanned,
            expired = report.expired,
            corrupt = report.corrupt,
            "Swept cache directory"
        );
        Ok(report)
    }

    /// Snapshot of cache counters.
    pub fn stats(&self) -> CacheStats {
        let c = self.counters.lock();
        CacheStats {
            hot_hits: c.hot_hits,
            disk_hits: c.disk_hits,
            legacy_migrations: c.legacy_migrations,
            misses: c.misses,
            writes: c.writes,
            write_failures: c.write_failures,
            expired_removed: c.expired_removed,
            bytes_saved: c.bytes_saved,
            avg_compression_ratio: c.avg_ratio,
            hot: self.hot.stats(),
        }
    }

    async fn discard_file(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "Failed to delete cache file: {e}");
            }
        }
    }
}

impl<P: Payload> std::fmt::Debug for CompressedCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedCache")
            .field("dir", &self.config.dir)
            .field("ttl_hours", &self.config.ttl_hours)
            .field("indexed", &self.index.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::index::SearchCriteria;
    use crate::payload::{JobRecord, ListingPage};
    use chrono::Duration;
    use tempfile::TempDir;

    const URL: &str = "https://jobs.example.com/search?q=rust";

    fn page(company: &str, n: usize) -> ListingPage {
        let jobs = (0..n)
            .map(|i| {
                JobRecord::new(format!("Engineer {i}"))
                    .with_company(company)
                    .with_technologies(["rust"])
                    .with_salary(Some(90_000), Some(120_000))
            })
            .collect();
        ListingPage::new(URL, jobs)
    }

    fn config(temp: &TempDir, ttl_hours: u64) -> CacheConfig {
        CacheConfig {
            ttl_hours,
            ..CacheConfig::new(temp.path())
        }
    }

    async fn open(temp: &TempDir, clock: &Arc<ManualClock>) -> CompressedCache<ListingPage> {
        CompressedCache::open_with_clock(config(temp, 1), clock.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrips() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = open(&temp, &clock).await;
        let original = page("Acme", 25);

        cache.set(URL, original.clone()).await.unwrap();
        assert_eq!(cache.get(URL).await, Some(original));

        let key = CacheKey::from_source(URL);
        assert!(temp.path().join(format!("{key}.json.gz")).exists());
        let stats = cache.stats();
        assert_eq!(stats.hot_hits, 1);
        assert_eq!(stats.writes, 1);
        assert!(stats.bytes_saved > 0);
        assert!(stats.avg_compression_ratio < 1.0);
    }

    #[tokio::test]
    async fn test_reopened_cache_reads_from_disk() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let original = page("Acme", 3);
        open(&temp, &clock).await.set(URL, original.clone()).await.unwrap();

        let reopened = open(&temp, &clock).await;
        assert_eq!(reopened.get(URL).await, Some(original.clone()));
        assert_eq!(reopened.stats().disk_hits, 1);

        // promoted into the hot layer
        assert_eq!(reopened.get(URL).await, Some(original));
        assert_eq!(reopened.stats().hot_hits, 1);
    }

    #[tokio::test]
    async fn test_equivalent_identifiers_share_an_entry() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = open(&temp, &clock).await;
        cache
            .set("https://jobs.example.com/search?q=rust&page=1", page("Acme", 1))
            .await
            .unwrap();
        assert!(
            cache
                .get("https://JOBS.example.com/search?page=1&q=rust#results")
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_ttl_boundary_in_hot_layer_and_on_disk() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = open(&temp, &clock).await;
        cache.set(URL, page("Acme", 1)).await.unwrap();

        clock.advance(Duration::minutes(59));
        assert!(cache.get(URL).await.is_some());

        let reopened = open(&temp, &clock).await;
        assert!(reopened.get(URL).await.is_some());

        clock.advance(Duration::minutes(2));
        assert!(cache.get(URL).await.is_none());
        let key = CacheKey::from_source(URL);
        assert!(!temp.path().join(format!("{key}.json.gz")).exists());
        assert!(cache.index().get(&key).is_none());
    }

    #[tokio::test]
    async fn test_legacy_entry_is_migrated() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let original = page("Globex", 4);
        let entry = CacheEntry::new(URL, original.clone(), clock.now());
        let legacy = temp.path().join(format!("{}.json", entry.key));
        std::fs::write(&legacy, entry.encode().unwrap()).unwrap();

        let cache = open(&temp, &clock).await;
        assert_eq!(cache.get(URL).await, Some(original));

        assert!(!legacy.exists());
        assert!(temp.path().join(format!("{}.json.gz", entry.key)).exists());
        assert_eq!(cache.stats().legacy_migrations, 1);
        let hits = cache
            .index()
            .search(&SearchCriteria::default().company("globex"));
        assert_eq!(hits.len(), 1);
        assert!(hits[0].path.to_string_lossy().ends_with(".json.gz"));
    }

    #[tokio::test]
    async fn test_stale_legacy_entry_is_deleted() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let entry = CacheEntry::new(URL, page("Acme", 1), clock.now() - Duration::hours(3));
        let legacy = temp.path().join(format!("{}.json", entry.key));
        std::fs::write(&legacy, entry.encode().unwrap()).unwrap();

        let cache = open(&temp, &clock).await;
        assert!(cache.get(URL).await.is_none());
        assert!(!legacy.exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = open(&temp, &clock).await;
        let key = CacheKey::from_source(URL);
        std::fs::write(temp.path().join(format!("{key}.json.gz")), b"not gzip").unwrap();

        assert!(cache.get(URL).await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_set_indexes_record_bearing_payloads_only() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let pages = open(&temp, &clock).await;
        pages.set(URL, page("Acme", 2)).await.unwrap();
        assert_eq!(pages.index().len(), 1);

        let raw: CompressedCache<serde_json::Value> =
            CompressedCache::open_with_clock(config(&temp, 1), clock.clone())
                .await
                .unwrap();
        raw.set("plain-document", serde_json::json!({"hello": "world"}))
            .await
            .unwrap();
        assert_eq!(raw.index().len(), 1);
        assert_eq!(
            raw.get("plain-document").await,
            Some(serde_json::json!({"hello": "world"}))
        );
    }

    #[tokio::test]
    async fn test_delete_removes_every_trace() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = open(&temp, &clock).await;
        cache.set(URL, page("Acme", 2)).await.unwrap();

        assert!(cache.delete(URL).await);
        assert!(!cache.contains(URL).await);
        assert!(cache.get(URL).await.is_none());
        assert!(cache.index().is_empty());
        assert!(!cache.delete(URL).await);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_and_corrupt_files() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = open(&temp, &clock).await;
        cache.set("old", page("Acme", 1)).await.unwrap();
        clock.advance(Duration::minutes(90));
        cache.set("new", page("Globex", 1)).await.unwrap();
        let bogus = temp.path().join(format!("{}.json.gz", CacheKey::from_source("bogus")));
        std::fs::write(&bogus, b"garbage").unwrap();

        let report = cache.sweep_expired().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.expired, 1);
        assert_eq!(report.corrupt, 1);
        assert_eq!(report.removed(), 2);
        assert!(report.bytes_freed > 0);

        assert!(!bogus.exists());
        assert!(cache.contains("new").await);
        assert!(!cache.contains("old").await);
        assert_eq!(cache.index().len(), 1);
    }

    #[tokio::test]
    async fn test_open_rebuilds_missing_snapshot() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        {
            let cache = open(&temp, &clock).await;
            cache.set(URL, page("Acme", 2)).await.unwrap();
            cache.set("second", page("Globex", 1)).await.unwrap();
        }
        std::fs::remove_file(temp.path().join(SNAPSHOT_FILE)).unwrap();

        let reopened = open(&temp, &clock).await;
        assert_eq!(reopened.index().len(), 2);
        assert_eq!(reopened.index().stats().total_records, 3);
    }

    #[tokio::test]
    async fn test_open_rebuilds_corrupt_snapshot() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        open(&temp, &clock).await.set(URL, page("Acme", 2)).await.unwrap();
        std::fs::write(temp.path().join(SNAPSHOT_FILE), b"{ nope").unwrap();

        let reopened = open(&temp, &clock).await;
        assert!(!reopened.index().needs_rebuild());
        assert_eq!(reopened.index().len(), 1);
    }
}
