//! On-disk envelope for cached payloads.

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::CacheKey;
use super::codec;
use crate::payload::Payload;
use crate::{Error, Result};

/// Compressed entry file extension.
pub const COMPRESSED_EXT: &str = "json.gz";
/// Legacy uncompressed entry file extension.
pub const LEGACY_EXT: &str = "json";

/// A stored payload with its provenance.
///
/// Entries are only ever replaced wholesale; there is no partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<P> {
    /// Fingerprint of the normalized source identifier.
    pub key: CacheKey,
    /// Original source identifier.
    pub source_id: String,
    /// When the payload was written.
    pub written_at: DateTime<Utc>,
    /// The cached value.
    pub payload: P,
}

impl<P: Payload> CacheEntry<P> {
    /// Wrap a freshly fetched payload.
    pub fn new(source_id: impl Into<String>, payload: P, written_at: DateTime<Utc>) -> Self {
        let source_id = source_id.into();
        Self {
            key: CacheKey::from_source(&source_id),
            source_id,
            written_at,
            payload,
        }
    }

    /// Whether the entry is older than `ttl` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now - self.written_at > ttl
    }

    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("Failed to encode {}: {e}", self.key)))
    }

    /// Parse JSON bytes.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| Error::Serialization(format!("Failed to decode entry: {e}")))
    }
}

/// A decoded entry file with the byte sizes needed by the index.
#[derive(Debug, Clone)]
pub struct LoadedEntry<P> {
    /// Decoded envelope.
    pub entry: CacheEntry<P>,
    /// Uncompressed JSON size.
    pub raw_size: u64,
    /// Size of the file on disk.
    pub stored_size: u64,
}

/// Read and decode an entry file, decompressing when `compressed` is set.
pub async fn read_entry_file<P: Payload>(path: &Path, compressed: bool) -> Result<LoadedEntry<P>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::Storage(format!("Failed to read {}: {e}", path.display())))?;
    let stored_size = bytes.len() as u64;
    let raw = if compressed {
        codec::decompress(&bytes)?
    } else {
        bytes
    };
    let raw_size = raw.len() as u64;
    let entry = CacheEntry::decode(&raw)?;
    Ok(LoadedEntry {
        entry,
        raw_size,
        stored_size,
    })
}

/// Write `bytes` to `path` atomically (temp file + rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(|e| {
        Error::Storage(format!(
            "Failed to write temp file {}: {e}",
            tmp_path.display()
        ))
    })?;

    // Handle Windows: remove target before rename
    #[cfg(target_os = "windows")]
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to remove existing file: {e}")))?;
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Storage(format!(
            "Failed to commit {}: {e}",
            path.display()
        )));
    }
    Ok(())
}
