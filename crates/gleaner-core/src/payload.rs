//! Cached payload types and metadata extraction.
//!
//! The compressed cache stores any [`Payload`]. Payloads that carry a record
//! collection expose it through [`Payload::metadata`], which feeds the cache
//! index with denormalized search fields. [`ListingPage`] is the concrete
//! payload for scraped job listings.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A value that can be stored in the compressed cache.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Denormalized metadata for the cache index.
    ///
    /// Returns `None` when the payload has no record collection; such entries
    /// are cached but not indexed.
    fn metadata(&self) -> Option<EntryMetadata> {
        None
    }
}

/// One extracted job posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Posting title.
    pub title: String,
    /// Hiring company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Location as displayed on the posting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Technologies mentioned by the posting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    /// Lower bound of the advertised yearly salary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<u64>,
    /// Upper bound of the advertised yearly salary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<u64>,
    /// Seniority level (e.g. "senior").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// When the posting was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a record with only a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the company using builder pattern.
    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Set the location using builder pattern.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the technologies using builder pattern.
    #[must_use]
    pub fn with_technologies<I, S>(mut self, technologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.technologies = technologies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the salary range using builder pattern.
    #[must_use]
    pub const fn with_salary(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.salary_min = min;
        self.salary_max = max;
        self
    }

    /// Set the level using builder pattern.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Salary bucket label for this posting, if any salary is advertised.
    ///
    /// Uses the midpoint when both bounds are present.
    ///
    /// ```rust
    /// use gleaner_core::JobRecord;
    ///
    /// let job = JobRecord::new("Engineer").with_salary(Some(90_000), Some(130_000));
    /// assert_eq!(job.salary_bucket(), Some("100k-150k"));
    /// ```
    #[must_use]
    pub fn salary_bucket(&self) -> Option<&'static str> {
        let amount = match (self.salary_min, self.salary_max) {
            (Some(min), Some(max)) => min / 2 + max / 2,
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => return None,
        };
        Some(match amount {
            0..50_000 => "<50k",
            50_000..100_000 => "50k-100k",
            100_000..150_000 => "100k-150k",
            150_000..200_000 => "150k-200k",
            _ => "200k+",
        })
    }
}

/// A fetched results page with the job records extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    /// URL the page was rendered from.
    pub source_url: String,
    /// Page title, when the renderer captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Records extracted from the page.
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

impl ListingPage {
    /// Create a page from its records.
    #[must_use]
    pub fn new(source_url: impl Into<String>, jobs: Vec<JobRecord>) -> Self {
        Self {
            source_url: source_url.into(),
            title: None,
            jobs,
        }
    }
}

impl Payload for ListingPage {
    fn metadata(&self) -> Option<EntryMetadata> {
        Some(EntryMetadata::from_records(&self.jobs))
    }
}

/// Denormalized, deduplicated fields extracted from a payload's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Number of records in the payload.
    pub record_count: usize,
    /// Distinct companies.
    #[serde(default)]
    pub companies: BTreeSet<String>,
    /// Distinct technologies.
    #[serde(default)]
    pub technologies: BTreeSet<String>,
    /// Distinct locations.
    #[serde(default)]
    pub locations: BTreeSet<String>,
    /// Distinct salary bucket labels.
    #[serde(default)]
    pub salary_buckets: BTreeSet<String>,
    /// Distinct seniority levels.
    #[serde(default)]
    pub levels: BTreeSet<String>,
}

impl EntryMetadata {
    /// Build metadata from a slice of records.
    ///
    /// Blank values are skipped; surrounding whitespace is trimmed.
    ///
    /// ```rust
    /// use gleaner_core::{EntryMetadata, JobRecord};
    ///
    /// let jobs = vec![
    ///     JobRecord::new("Backend").with_company("Acme").with_technologies(["rust", "sql"]),
    ///     JobRecord::new("Frontend").with_company("Acme ").with_technologies(["typescript"]),
    /// ];
    /// let meta = EntryMetadata::from_records(&jobs);
    /// assert_eq!(meta.record_count, 2);
    /// assert_eq!(meta.companies.len(), 1);
    /// assert_eq!(meta.technologies.len(), 3);
    /// ```
    #[must_use]
    pub fn from_records(records: &[JobRecord]) -> Self {
        let mut meta = Self {
            record_count: records.len(),
            ..Self::default()
        };

        for record in records {
            insert_clean(&mut meta.companies, record.company.as_deref());
            insert_clean(&mut meta.locations, record.location.as_deref());
            insert_clean(&mut meta.levels, record.level.as_deref());
            for tech in &record.technologies {
                insert_clean(&mut meta.technologies, Some(tech));
            }
            if let Some(bucket) = record.salary_bucket() {
                meta.salary_buckets.insert(bucket.to_string());
            }
        }

        meta
    }
}

fn insert_clean(set: &mut BTreeSet<String>, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        set.insert(v.to_string());
    }
}

/// Normalized form used as an inverted-index key.
#[must_use]
pub fn normalize_term(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Plain JSON documents are cacheable but never indexed.
impl Payload for serde_json::Value {}
