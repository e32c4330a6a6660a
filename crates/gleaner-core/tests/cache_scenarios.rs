//! Compressed cache and index behavior against a real directory.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use gleaner_core::{
    CacheConfig, CacheKey, CompressedCache, JobRecord, ListingPage, ManualClock, SearchCriteria,
};
use tempfile::TempDir;

fn listing(url: &str, company: &str, techs: &[&str], count: usize) -> ListingPage {
    let jobs = (0..count)
        .map(|i| {
            JobRecord::new(format!("{company} engineer #{i}"))
                .with_company(company)
                .with_location(if i % 2 == 0 { "Berlin" } else { "Remote" })
                .with_technologies(techs.iter().copied())
                .with_salary(Some(60_000 + 10_000 * i as u64), None)
                .with_level("senior")
        })
        .collect();
    ListingPage::new(url, jobs)
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
    ))
}

async fn open(dir: &TempDir, clock: &Arc<ManualClock>) -> CompressedCache<ListingPage> {
    let config = CacheConfig {
        ttl_hours: 1,
        ..CacheConfig::new(dir.path())
    };
    CompressedCache::open_with_clock(config, clock.clone())
        .await
        .unwrap()
}

#[tokio::test]
async fn round_trip_preserves_every_field() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let cache = open(&dir, &clock).await;

    let mut page = listing("https://jobs.test/search?q=rust", "Acme", &["rust", "tokio"], 40);
    page.title = Some("Rust jobs".into());
    cache.set(&page.source_url, page.clone()).await.unwrap();

    // a fresh instance has an empty hot layer, so this goes through gzip
    let cold = open(&dir, &clock).await;
    assert_eq!(cold.get(&page.source_url).await, Some(page));
    assert_eq!(cold.stats().disk_hits, 1);
}

#[tokio::test]
async fn entry_is_a_hit_at_59_minutes_and_a_miss_at_61() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let cache = open(&dir, &clock).await;
    let url = "https://jobs.test/search?q=go";
    cache.set(url, listing(url, "Globex", &["go"], 2)).await.unwrap();

    clock.advance(Duration::minutes(59));
    assert!(cache.get(url).await.is_some());

    clock.advance(Duration::minutes(2));
    assert!(cache.get(url).await.is_none());
    assert!(cache.index().is_empty());
}

#[tokio::test]
async fn search_returns_exactly_the_matching_entry() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let cache = open(&dir, &clock).await;

    let a = "https://jobs.test/acme";
    let b = "https://jobs.test/globex";
    cache.set(a, listing(a, "Acme", &["rust"], 3)).await.unwrap();
    clock.advance(Duration::minutes(5));
    cache.set(b, listing(b, "Globex", &["rust", "go"], 2)).await.unwrap();

    let hits = cache
        .index()
        .search(&SearchCriteria::default().company("Acme"));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, CacheKey::from_source(a));
    assert_eq!(hits[0].metadata.record_count, 3);

    let rust = cache
        .index()
        .search(&SearchCriteria::default().technology("RUST"));
    let sources: Vec<_> = rust.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(sources, vec![b, a]);

    let top = cache.index().top_technologies(2);
    assert_eq!(top[0].term, "rust");
    assert_eq!(top[0].records, 5);
}

#[tokio::test]
async fn rebuild_twice_yields_identical_index() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let cache = open(&dir, &clock).await;
    for (i, company) in ["Acme", "Globex", "Initech", "Umbrella"].iter().enumerate() {
        let url = format!("https://jobs.test/{i}");
        cache
            .set(&url, listing(&url, company, &["rust", "sql"], i + 1))
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
    }
    let before = cache.index().snapshot();

    let first = cache.index().rebuild::<ListingPage>(dir.path()).await.unwrap();
    let after_first = cache.index().snapshot();
    let second = cache.index().rebuild::<ListingPage>(dir.path()).await.unwrap();
    let after_second = cache.index().snapshot();

    assert_eq!(first, 4);
    assert_eq!(second, 4);
    assert_eq!(after_first, after_second);
    assert!(before.entries.keys().eq(after_first.entries.keys()));
    assert_eq!(before.stats.total_records, after_first.stats.total_records);
}

#[tokio::test]
async fn sweep_clears_stale_entries_from_disk_and_index() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let cache = open(&dir, &clock).await;
    let stale = "https://jobs.test/stale";
    let fresh = "https://jobs.test/fresh";
    cache.set(stale, listing(stale, "Acme", &["rust"], 1)).await.unwrap();
    clock.advance(Duration::minutes(45));
    cache.set(fresh, listing(fresh, "Globex", &["go"], 1)).await.unwrap();
    clock.advance(Duration::minutes(30));

    let report = cache.sweep_expired().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.corrupt, 0);

    let remaining: Vec<_> = cache
        .index()
        .entries()
        .into_iter()
        .map(|e| e.source_id)
        .collect();
    assert_eq!(remaining, vec![fresh.to_string()]);
    assert!(cache.get(fresh).await.is_some());
}
