//! Secondary search index over cache metadata.
//!
//! [`CacheIndex`] keeps one [`IndexEntry`] per indexed cache key plus four
//! inverted indices (company, technology, location, date bucket) so that
//! filtered searches and aggregate statistics never touch the entry files.
//!
//! ## Consistency
//!
//! Every mutation updates the primary map, all inverted indices and the
//! aggregate statistics inside one critical section, so readers never observe
//! a key that is present in one structure but not another. Each mutation bumps
//! a revision counter and the resulting snapshot is persisted outside the lock
//! with an atomic temp-file-and-rename; a slower writer never overwrites a
//! newer snapshot.
//!
//! ## Recovery
//!
//! A snapshot that fails to parse, or whose inverted indices disagree with its
//! primary map, is discarded on [`CacheIndex::open`] and flagged via
//! [`CacheIndex::needs_rebuild`]. [`CacheIndex::rebuild`] reconstructs the
//! index from the entry files in a cache directory. Mutations made while the
//! directory is being scanned are journaled and replayed onto the rebuilt
//! index before it replaces the live one.
//!
//! ```rust,no_run
//! use gleaner_core::{CacheIndex, ListingPage, SearchCriteria};
//! use std::path::Path;
//!
//! # async fn demo() -> gleaner_core::Result<()> {
//! let index = CacheIndex::open(Path::new("/var/cache/gleaner/cache_index.json")).await;
//! if index.needs_rebuild() {
//!     index.rebuild::<ListingPage>(Path::new("/var/cache/gleaner")).await?;
//! }
//! for entry in index.search(&SearchCriteria::default().company("Acme")) {
//!     println!("{} ({} records)", entry.source_id, entry.metadata.record_count);
//! }
//! # Ok(())
//! # }
//! ```

mod search;
mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use search::SearchCriteria;
pub use types::{IndexEntry, IndexSnapshot, IndexStats, InvertedIndex, TermCount, SNAPSHOT_VERSION};

use crate::cache::entry::{COMPRESSED_EXT, LEGACY_EXT, read_entry_file, write_atomic};
use crate::cache::CacheKey;
use crate::payload::{EntryMetadata, Payload, normalize_term};
use crate::{Error, Result};

/// Default snapshot filename inside a cache directory.
pub const SNAPSHOT_FILE: &str = "cache_index.json";

struct IndexState {
    snapshot: IndexSnapshot,
    revision: u64,
    /// Rebuilds currently scanning a directory.
    rebuilds: usize,
    /// Mutations made since the oldest in-flight rebuild started.
    journal: Vec<Change>,
}

impl IndexState {
    fn record(&mut self, change: impl FnOnce() -> Change) {
        if self.rebuilds > 0 {
            self.journal.push(change());
        }
    }
}

/// A mutation a rebuild must replay on top of what it scanned.
enum Change {
    Upsert(IndexEntry),
    Remove(CacheKey),
}

impl Change {
    fn apply(&self, snapshot: &mut IndexSnapshot) {
        match self {
            Self::Upsert(entry) => insert_entry(snapshot, entry.clone()),
            Self::Remove(key) => {
                unlink_entry(snapshot, key);
            },
        }
    }
}

/// Keeps the journal open for one rebuild; closes it on drop.
struct RebuildScan<'a> {
    state: &'a Mutex<IndexState>,
    /// Journal position when the scan started.
    from: usize,
    open: bool,
}

impl<'a> RebuildScan<'a> {
    fn begin(state: &'a Mutex<IndexState>) -> Self {
        let mut guard = state.lock();
        guard.rebuilds += 1;
        let from = guard.journal.len();
        Self {
            state,
            from,
            open: true,
        }
    }

    /// Replay journaled mutations onto `snapshot` and close the scan.
    fn finish(&mut self, state: &mut IndexState, snapshot: &mut IndexSnapshot) {
        for change in &state.journal[self.from..] {
            change.apply(snapshot);
        }
        self.open = false;
        close_scan(state);
    }
}

impl Drop for RebuildScan<'_> {
    fn drop(&mut self) {
        if self.open {
            close_scan(&mut self.state.lock());
        }
    }
}

fn close_scan(state: &mut IndexState) {
    state.rebuilds = state.rebuilds.saturating_sub(1);
    if state.rebuilds == 0 {
        state.journal.clear();
    }
}

/// Searchable, persisted metadata about cache entries.
pub struct CacheIndex {
    snapshot_path: PathBuf,
    state: Mutex<IndexState>,
    /// Revision of the last snapshot written to disk.
    persisted: tokio::sync::Mutex<u64>,
    needs_rebuild: AtomicBool,
}

impl CacheIndex {
    /// Create an empty index that persists to `snapshot_path`.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self::from_snapshot(snapshot_path.into(), empty_snapshot(), false)
    }

    fn from_snapshot(snapshot_path: PathBuf, snapshot: IndexSnapshot, needs_rebuild: bool) -> Self {
        Self {
            snapshot_path,
            state: Mutex::new(IndexState {
                snapshot,
                revision: 0,
                rebuilds: 0,
                journal: Vec::new(),
            }),
            persisted: tokio::sync::Mutex::new(0),
            needs_rebuild: AtomicBool::new(needs_rebuild),
        }
    }

    /// Load the index from `snapshot_path`.
    ///
    /// Never fails: a missing snapshot yields an empty index, and an unreadable,
    /// corrupt or inconsistent one yields an empty index flagged for rebuild.
    pub async fn open(snapshot_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();

        let bytes = match tokio::fs::read(&snapshot_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %snapshot_path.display(), "No index snapshot yet");
                return Self::new(snapshot_path);
            },
            Err(e) => {
                warn!(path = %snapshot_path.display(), "Failed to read index snapshot: {e}");
                return Self::from_snapshot(snapshot_path, empty_snapshot(), true);
            },
        };

        let loaded = serde_json::from_slice::<IndexSnapshot>(&bytes)
            .map_err(|e| Error::IndexCorruption(e.to_string()))
            .and_then(|snapshot| {
                if snapshot.version == SNAPSHOT_VERSION {
                    check_snapshot(&snapshot).map(|()| snapshot)
                } else {
                    Err(Error::IndexCorruption(format!(
                        "unsupported snapshot version {}",
                        snapshot.version
                    )))
                }
            });

        match loaded {
            Ok(snapshot) => {
                debug!(
                    path = %snapshot_path.display(),
                    entries = snapshot.entries.len(),
                    "Loaded index snapshot"
                );
                Self::from_snapshot(snapshot_path, snapshot, false)
            },
            Err(e) => {
                warn!(
                    path = %snapshot_path.display(),
                    category = e.category(),
                    "Discarding index snapshot: {e}"
                );
                Self::from_snapshot(snapshot_path, empty_snapshot(), true)
            },
        }
    }

    /// Where snapshots are written.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Whether the loaded snapshot was discarded and should be rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::Acquire)
    }

    /// Register or replace the entry for `entry.key` and persist a snapshot.
    pub async fn add_entry(&self, entry: IndexEntry) {
        let key = entry.key.clone();
        let commit = {
            let mut state = self.state.lock();
            state.record(|| Change::Upsert(entry.clone()));
            insert_entry(&mut state.snapshot, entry);
            recompute_stats(&mut state.snapshot);
            bump_revision(&mut state)
        };
        debug!(%key, "Indexed cache entry");
        self.persist_quietly(commit).await;
    }

    /// Remove `key` from the primary map and every inverted index.
    ///
    /// Returns `false` if the key was not indexed.
    pub async fn remove_entry(&self, key: &CacheKey) -> bool {
        let commit = {
            let mut state = self.state.lock();
            state.record(|| Change::Remove(key.clone()));
            if unlink_entry(&mut state.snapshot, key).is_none() {
                return false;
            }
            recompute_stats(&mut state.snapshot);
            bump_revision(&mut state)
        };
        debug!(%key, "Removed cache entry from index");
        self.persist_quietly(commit).await;
        true
    }

    /// Look up a single entry.
    pub fn get(&self, key: &CacheKey) -> Option<IndexEntry> {
        self.state.lock().snapshot.entries.get(key).cloned()
    }

    /// Whether `key` is indexed.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().snapshot.entries.contains_key(key)
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.state.lock().snapshot.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in key order.
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.state.lock().snapshot.entries.values().cloned().collect()
    }

    /// Copy of the full in-memory state.
    pub fn snapshot(&self) -> IndexSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// Filter entries; results are ordered most recently written first.
    pub fn search(&self, criteria: &SearchCriteria) -> Vec<IndexEntry> {
        let state = self.state.lock();
        search::run(&state.snapshot, criteria)
    }

    /// Keys written on `date` (UTC), via the date-bucket index.
    pub fn keys_for_date(&self, date: NaiveDate) -> Vec<CacheKey> {
        let state = self.state.lock();
        state
            .snapshot
            .dates
            .get(&date.to_string())
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> IndexStats {
        self.state.lock().snapshot.stats.clone()
    }

    /// Companies ranked by the total records of the entries listing them.
    pub fn top_companies(&self, n: usize) -> Vec<TermCount> {
        let state = self.state.lock();
        top_terms(&state.snapshot, n, |m| &m.companies)
    }

    /// Technologies ranked by the total records of the entries listing them.
    pub fn top_technologies(&self, n: usize) -> Vec<TermCount> {
        let state = self.state.lock();
        top_terms(&state.snapshot, n, |m| &m.technologies)
    }

    /// Verify that the inverted indices and statistics agree with the primary map.
    pub fn check_consistency(&self) -> Result<()> {
        check_snapshot(&self.state.lock().snapshot)
    }

    /// Persist the current state, surfacing any write error.
    pub async fn save(&self) -> Result<()> {
        let commit = {
            let mut state = self.state.lock();
            bump_revision(&mut state)
        };
        let (revision, bytes) = commit;
        self.persist(revision, bytes?).await
    }

    /// Rebuild from the entry files in `dir`, returning how many were indexed.
    ///
    /// Compressed files take precedence over legacy files for the same key.
    /// Unreadable files and payloads without records are skipped. Entries
    /// added or removed while the scan runs keep their latest state.
    pub async fn rebuild<P: Payload>(&self, dir: &Path) -> Result<usize> {
        let mut scan = RebuildScan::begin(&self.state);
        let files = scan_entry_files(dir).await?;
        let mut snapshot = empty_snapshot();

        for (key, (path, compressed)) in files {
            let loaded = match read_entry_file::<P>(&path, compressed).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(%key, path = %path.display(), "Skipping unreadable entry during rebuild: {e}");
                    continue;
                },
            };
            let Some(metadata) = loaded.entry.payload.metadata() else {
                continue;
            };
            insert_entry(
                &mut snapshot,
                IndexEntry::new(
                    key,
                    path,
                    loaded.entry.source_id,
                    loaded.entry.written_at,
                    metadata,
                    loaded.raw_size,
                    loaded.stored_size,
                ),
            );
        }

        let (count, commit) = {
            let mut state = self.state.lock();
            scan.finish(&mut state, &mut snapshot);
            recompute_stats(&mut snapshot);
            state.snapshot = snapshot;
            (state.snapshot.entries.len(), bump_revision(&mut state))
        };
        self.needs_rebuild.store(false, Ordering::Release);
        info!(dir = %dir.display(), entries = count, "Rebuilt cache index");

        let (revision, bytes) = commit;
        self.persist(revision, bytes?).await?;
        Ok(count)
    }

    async fn persist_quietly(&self, commit: (u64, Result<Vec<u8>>)) {
        let (revision, bytes) = commit;
        let result = match bytes {
            Ok(bytes) => self.persist(revision, bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                path = %self.snapshot_path.display(),
                "Failed to persist index snapshot (in-memory index remains authoritative): {e}"
            );
        }
    }

    async fn persist(&self, revision: u64, bytes: Vec<u8>) -> Result<()> {
        let mut persisted = self.persisted.lock().await;
        if revision <= *persisted {
            return Ok(());
        }

        if let Some(parent) = self.snapshot_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Index(format!("Failed to create index directory: {e}")))?;
        }
        write_atomic(&self.snapshot_path, &bytes)
            .await
            .map_err(|e| Error::Index(e.to_string()))?;
        *persisted = revision;
        Ok(())
    }
}

impl std::fmt::Debug for CacheIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheIndex")
            .field("snapshot_path", &self.snapshot_path)
            .field("entries", &self.len())
            .field("needs_rebuild", &self.needs_rebuild())
            .finish()
    }
}

fn empty_snapshot() -> IndexSnapshot {
    IndexSnapshot {
        version: SNAPSHOT_VERSION,
        ..IndexSnapshot::default()
    }
}

fn bump_revision(state: &mut IndexState) -> (u64, Result<Vec<u8>>) {
    state.revision += 1;
    let bytes = serde_json::to_vec_pretty(&state.snapshot).map_err(Error::from);
    (state.revision, bytes)
}

/// Normalized terms per indexed dimension, in the order
/// company, technology, location, date bucket.
fn dimension_terms(entry: &IndexEntry) -> [BTreeSet<String>; 4] {
    let norm = |set: &BTreeSet<String>| set.iter().map(|v| normalize_term(v)).collect();
    [
        norm(&entry.metadata.companies),
        norm(&entry.metadata.technologies),
        norm(&entry.metadata.locations),
        BTreeSet::from([entry.date_bucket()]),
    ]
}

fn indices_mut(snapshot: &mut IndexSnapshot) -> [&mut InvertedIndex; 4] {
    [
        &mut snapshot.companies,
        &mut snapshot.technologies,
        &mut snapshot.locations,
        &mut snapshot.dates,
    ]
}

fn insert_entry(snapshot: &mut IndexSnapshot, entry: IndexEntry) {
    let key = entry.key.clone();
    unlink_entry(snapshot, &key);

    let terms = dimension_terms(&entry);
    for (index, terms) in indices_mut(snapshot).into_iter().zip(terms) {
        for term in terms {
            index.entry(term).or_default().insert(key.clone());
        }
    }
    snapshot.entries.insert(key, entry);
}

fn unlink_entry(snapshot: &mut IndexSnapshot, key: &CacheKey) -> Option<IndexEntry> {
    let entry = snapshot.entries.remove(key)?;
    let terms = dimension_terms(&entry);
    for (index, terms) in indices_mut(snapshot).into_iter().zip(terms) {
        for term in terms {
            if let Some(keys) = index.get_mut(&term) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(&term);
                }
            }
        }
    }
    Some(entry)
}

fn compute_stats(entries: &BTreeMap<CacheKey, IndexEntry>) -> IndexStats {
    let mut stats = IndexStats {
        total_entries: entries.len(),
        ..IndexStats::default()
    };
    let mut ratio_sum = 0.0;
    for entry in entries.values() {
        stats.total_records += entry.metadata.record_count;
        stats.total_raw_bytes += entry.raw_size;
        stats.total_compressed_bytes += entry.compressed_size;
        ratio_sum += entry.compression_ratio;
        stats.oldest = Some(stats.oldest.map_or(entry.written_at, |t| t.min(entry.written_at)));
        stats.newest = Some(stats.newest.map_or(entry.written_at, |t| t.max(entry.written_at)));
    }
    if !entries.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let count = entries.len() as f64;
        stats.mean_compression_ratio = ratio_sum / count;
    }
    stats
}

fn recompute_stats(snapshot: &mut IndexSnapshot) {
    snapshot.stats = compute_stats(&snapshot.entries);
}

fn check_snapshot(snapshot: &IndexSnapshot) -> Result<()> {
    let mut expected: [InvertedIndex; 4] = Default::default();
    for (key, entry) in &snapshot.entries {
        if &entry.key != key {
            return Err(Error::IndexCorruption(format!(
                "entry stored under {key} claims key {}",
                entry.key
            )));
        }
        for (index, terms) in expected.iter_mut().zip(dimension_terms(entry)) {
            for term in terms {
                index.entry(term).or_default().insert(key.clone());
            }
        }
    }

    let actual = [
        &snapshot.companies,
        &snapshot.technologies,
        &snapshot.locations,
        &snapshot.dates,
    ];
    let names = ["company", "technology", "location", "date"];
    for ((expected, actual), name) in expected.iter().zip(actual).zip(names) {
        if expected != actual {
            return Err(Error::IndexCorruption(format!(
                "{name} index does not match primary entries"
            )));
        }
    }

    if !stats_match(&compute_stats(&snapshot.entries), &snapshot.stats) {
        return Err(Error::IndexCorruption(
            "aggregate statistics do not match primary entries".into(),
        ));
    }
    Ok(())
}

fn stats_match(a: &IndexStats, b: &IndexStats) -> bool {
    a.total_entries == b.total_entries
        && a.total_records == b.total_records
        && a.total_raw_bytes == b.total_raw_bytes
        && a.total_compressed_bytes == b.total_compressed_bytes
        && a.oldest == b.oldest
        && a.newest == b.newest
        && (a.mean_compression_ratio - b.mean_compression_ratio).abs() < 1e-9
}

fn top_terms(
    snapshot: &IndexSnapshot,
    n: usize,
    field: impl Fn(&EntryMetadata) -> &BTreeSet<String>,
) -> Vec<TermCount> {
    let mut totals: BTreeMap<String, TermCount> = BTreeMap::new();
    for entry in snapshot.entries.values() {
        // case variants within one entry count once
        let mut seen = BTreeSet::new();
        for value in field(&entry.metadata) {
            let term = normalize_term(value);
            if !seen.insert(term.clone()) {
                continue;
            }
            let slot = totals.entry(term).or_insert_with(|| TermCount {
                term: value.clone(),
                records: 0,
                entries: 0,
            });
            slot.records += entry.metadata.record_count;
            slot.entries += 1;
        }
    }

    let mut ranked: Vec<TermCount> = totals.into_values().collect();
    ranked.sort_by(|a, b| b.records.cmp(&a.records).then_with(|| a.term.cmp(&b.term)));
    ranked.truncate(n);
    ranked
}

/// A `ck_` entry file found in a cache directory.
#[derive(Debug, Clone)]
pub(crate) struct EntryFile {
    pub key: CacheKey,
    pub path: PathBuf,
    pub compressed: bool,
}

/// Every entry file in `dir`, in both forms, sorted by file name.
pub(crate) async fn list_entry_files(dir: &Path) -> Result<Vec<EntryFile>> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::Storage(format!(
                "Failed to read cache directory {}: {e}",
                dir.display()
            )));
        },
    };

    let compressed_suffix = format!(".{COMPRESSED_EXT}");
    let legacy_suffix = format!(".{LEGACY_EXT}");
    let mut files = Vec::new();
    while let Some(dirent) = reader
        .next_entry()
        .await
        .map_err(|e| Error::Storage(format!("Failed to read directory entry: {e}")))?
    {
        let path = dirent.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let (stem, compressed) = if let Some(stem) = name.strip_suffix(&compressed_suffix) {
            (stem, true)
        } else if let Some(stem) = name.strip_suffix(&legacy_suffix) {
            (stem, false)
        } else {
            continue;
        };
        if let Some(key) = CacheKey::from_file_stem(stem) {
            files.push(EntryFile {
                key,
                path,
                compressed,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// One file per key, preferring the compressed form.
async fn scan_entry_files(dir: &Path) -> Result<BTreeMap<CacheKey, (PathBuf, bool)>> {
    let mut by_key: BTreeMap<CacheKey, (PathBuf, bool)> = BTreeMap::new();
    for file in list_entry_files(dir).await? {
        if file.compressed {
            by_key.insert(file.key, (file.path, true));
        } else {
            by_key.entry(file.key).or_insert((file.path, false));
        }
    }
    Ok(by_key)
}
