//! Filtered search over the cache index.
//!
//! Indexed dimensions (company, technology, location, date bucket) are
//! resolved through their inverted indices: values within a dimension are
//! OR-ed, dimensions are AND-ed. The remaining predicates are evaluated
//! directly against each candidate entry.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{IndexEntry, IndexSnapshot, InvertedIndex};
use crate::cache::CacheKey;
use crate::payload::normalize_term;

/// Filters for [`CacheIndex::search`](super::CacheIndex::search).
///
/// ```rust
/// use gleaner_core::SearchCriteria;
///
/// let criteria = SearchCriteria::default()
///     .company("Acme")
///     .technology("rust")
///     .min_records(5)
///     .limit(20);
/// assert_eq!(criteria.companies, vec!["Acme".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    /// Match entries listing any of these companies.
    pub companies: Vec<String>,
    /// Match entries listing any of these technologies.
    pub technologies: Vec<String>,
    /// Match entries listing any of these locations.
    pub locations: Vec<String>,
    /// Match entries written on any of these UTC dates.
    pub on_dates: Vec<NaiveDate>,
    /// Only entries written at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only entries written at or before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Only entries with at least this many records.
    pub min_records: Option<usize>,
    /// Only entries whose uncompressed size is at least this many bytes.
    pub min_raw_size: Option<u64>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl SearchCriteria {
    /// Add a company filter value.
    #[must_use]
    pub fn company(mut self, value: impl Into<String>) -> Self {
        self.companies.push(value.into());
        self
    }

    /// Add a technology filter value.
    #[must_use]
    pub fn technology(mut self, value: impl Into<String>) -> Self {
        self.technologies.push(value.into());
        self
    }

    /// Add a location filter value.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.locations.push(value.into());
        self
    }

    /// Add a date-bucket filter value.
    #[must_use]
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.on_dates.push(date);
        self
    }

    /// Restrict to a write-time range (inclusive on both ends).
    #[must_use]
    pub const fn between(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Require a minimum record count.
    #[must_use]
    pub const fn min_records(mut self, count: usize) -> Self {
        self.min_records = Some(count);
        self
    }

    /// Require a minimum uncompressed size.
    #[must_use]
    pub const fn min_raw_size(mut self, bytes: u64) -> Self {
        self.min_raw_size = Some(bytes);
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &IndexEntry) -> bool {
        self.since.is_none_or(|since| entry.written_at >= since)
            && self.until.is_none_or(|until| entry.written_at <= until)
            && self
                .min_records
                .is_none_or(|min| entry.metadata.record_count >= min)
            && self.min_raw_size.is_none_or(|min| entry.raw_size >= min)
    }
}

fn union_of(index: &InvertedIndex, values: &[String]) -> BTreeSet<CacheKey> {
    values
        .iter()
        .filter_map(|v| index.get(&normalize_term(v)))
        .flatten()
        .cloned()
        .collect()
}

/// Run `criteria` against a snapshot, newest first.
pub(super) fn run(snapshot: &IndexSnapshot, criteria: &SearchCriteria) -> Vec<IndexEntry> {
    let date_terms: Vec<String> = criteria.on_dates.iter().map(ToString::to_string).collect();
    let dimensions: [(&[String], &InvertedIndex); 4] = [
        (&criteria.companies, &snapshot.companies),
        (&criteria.technologies, &snapshot.technologies),
        (&criteria.locations, &snapshot.locations),
        (&date_terms, &snapshot.dates),
    ];

    let mut candidates: Option<BTreeSet<CacheKey>> = None;
    for (values, index) in dimensions {
        if values.is_empty() {
            continue;
        }
        let matched = union_of(index, values);
        let next = match candidates {
            None => matched,
            Some(current) => current.intersection(&matched).cloned().collect(),
        };
        if next.is_empty() {
            return Vec::new();
        }
        candidates = Some(next);
    }

    let mut results: Vec<IndexEntry> = match candidates {
        Some(keys) => keys
            .iter()
            .filter_map(|k| snapshot.entries.get(k))
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect(),
        None => snapshot
            .entries
            .values()
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect(),
    };

    results.sort_by(|a, b| {
        b.written_at
            .cmp(&a.written_at)
            .then_with(|| a.key.cmp(&b.key))
    });
    if let Some(limit) = criteria.limit {
        results.truncate(limit);
    }
    results
}
