//! Request fingerprints used to address cache entries.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Filename prefix shared by every cache entry.
pub const KEY_PREFIX: &str = "ck_";

/// Durable cache key: `ck_<sha256_32>`
///
/// Derived from the normalized source identifier, so equivalent requests
/// (differing only in query-parameter order, fragment, host case or stray
/// whitespace) share one entry.
///
/// ```rust
/// use gleaner_core::CacheKey;
///
/// let a = CacheKey::from_source("https://Jobs.example.com/search?q=rust&page=2#top");
/// let b = CacheKey::from_source("https://jobs.example.com/search?page=2&q=rust");
/// assert_eq!(a, b);
/// assert!(a.as_str().starts_with("ck_"));
/// assert_eq!(a.as_str().len(), 35);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint a source identifier (URL or free-form query).
    #[must_use]
    pub fn from_source(source_id: &str) -> Self {
        let normalized = normalize_source(source_id);
        let digest = Sha256::digest(normalized.as_bytes());
        let hex = digest.iter().take(16).fold(String::new(), |mut acc, b| {
            // write! to String is infallible
            let _ = write!(acc, "{b:02x}");
            acc
        });
        Self(format!("{KEY_PREFIX}{hex}"))
    }

    /// Reconstruct a key from a stored file stem, if it looks like one.
    #[must_use]
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let hex = stem.strip_prefix(KEY_PREFIX)?;
        let valid = hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self(stem.to_string()))
    }

    /// The key as a string, including the `ck_` prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of a source identifier.
///
/// URLs lose their fragment, get sorted query pairs and lose a trailing slash
/// on non-root paths. Anything else is trimmed, whitespace-collapsed and
/// lowercased.
#[must_use]
pub fn normalize_source(source_id: &str) -> String {
    let trimmed = source_id.trim();

    if let Ok(mut url) = Url::parse(trimmed) {
        if url.has_host() {
            url.set_fragment(None);

            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if pairs.is_empty() {
                url.set_query(None);
            } else {
                pairs.sort();
                url.query_pairs_mut().clear().extend_pairs(pairs);
            }

            let path = url.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                url.set_path(path.trim_end_matches('/'));
            }

            return url.to_string();
        }
    }

    trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
