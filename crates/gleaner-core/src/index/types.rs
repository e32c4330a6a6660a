//! Type definitions for the cache index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::payload::EntryMetadata;

/// Searchable metadata about one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Cache key of the entry.
    pub key: CacheKey,
    /// Location of the entry file.
    pub path: PathBuf,
    /// Original source identifier (URL or query).
    pub source_id: String,
    /// When the entry was written.
    pub written_at: DateTime<Utc>,
    /// Serialized size before compression, in bytes.
    pub raw_size: u64,
    /// Size on disk, in bytes.
    pub compressed_size: u64,
    /// `compressed_size / raw_size`; lower is better. 1.0 for empty payloads.
    pub compression_ratio: f64,
    /// Denormalized fields extracted from the payload.
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    /// Build an entry, deriving the compression ratio from the two sizes.
    #[must_use]
    pub fn new(
        key: CacheKey,
        path: PathBuf,
        source_id: impl Into<String>,
        written_at: DateTime<Utc>,
        metadata: EntryMetadata,
        raw_size: u64,
        compressed_size: u64,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let compression_ratio = if raw_size == 0 {
            1.0
        } else {
            compressed_size as f64 / raw_size as f64
        };
        Self {
            key,
            path,
            source_id: source_id.into(),
            written_at,
            raw_size,
            compressed_size,
            compression_ratio,
            metadata,
        }
    }

    /// Date bucket (`YYYY-MM-DD`, UTC) this entry falls into.
    #[must_use]
    pub fn date_bucket(&self) -> String {
        self.written_at.date_naive().to_string()
    }
}

/// Aggregate statistics over every indexed entry.
///
/// Recomputed from the primary map whenever membership changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Number of indexed entries.
    pub total_entries: usize,
    /// Sum of record counts across entries.
    pub total_records: usize,
    /// Sum of uncompressed sizes.
    pub total_raw_bytes: u64,
    /// Sum of on-disk sizes.
    pub total_compressed_bytes: u64,
    /// Mean of per-entry compression ratios; 0 when empty.
    pub mean_compression_ratio: f64,
    /// Oldest write timestamp.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest write timestamp.
    pub newest: Option<DateTime<Utc>>,
}

impl IndexStats {
    /// Bytes saved by compression across all entries.
    #[must_use]
    pub const fn bytes_saved(&self) -> u64 {
        self.total_raw_bytes.saturating_sub(self.total_compressed_bytes)
    }
}

/// A term ranked by the records it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermCount {
    /// Display form of the term (first spelling encountered).
    pub term: String,
    /// Sum of record counts over entries listing the term. Used for ranking.
    pub records: usize,
    /// Number of entries listing the term.
    pub entries: usize,
}

/// Inverted index: normalized value to the keys whose metadata lists it.
pub type InvertedIndex = BTreeMap<String, BTreeSet<CacheKey>>;

/// Persisted form of the whole index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    /// Snapshot schema version.
    pub version: u32,
    /// Primary map.
    pub entries: BTreeMap<CacheKey, IndexEntry>,
    /// Company inverted index.
    pub companies: InvertedIndex,
    /// Technology inverted index.
    pub technologies: InvertedIndex,
    /// Location inverted index.
    pub locations: InvertedIndex,
    /// Date-bucket inverted index (`YYYY-MM-DD`).
    pub dates: InvertedIndex,
    /// Aggregate statistics.
    pub stats: IndexStats,
}

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;
