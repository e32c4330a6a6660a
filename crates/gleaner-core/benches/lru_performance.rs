//! Benchmarks for the hot cache layer and index search
//!
//! Covers:
//! - LRU hits and misses at several capacities
//! - Insert pressure with constant eviction
//! - Multi-term index search over a populated cache

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use gleaner_core::{
    CacheConfig, CompressedCache, JobRecord, ListingPage, LruTtlCache, SearchCriteria,
};
use tempfile::TempDir;
use tokio::runtime::Runtime;

const COMPANIES: [&str; 6] = ["Acme", "Globex", "Initech", "Umbrella", "Hooli", "Stark"];
const TECHNOLOGIES: [&str; 8] = [
    "rust", "go", "python", "kubernetes", "postgres", "react", "kafka", "terraform",
];

fn create_listing(i: usize) -> ListingPage {
    let jobs = (0..20)
        .map(|j| {
            JobRecord::new(format!("Engineer {i}-{j}"))
                .with_company(COMPANIES[(i + j) % COMPANIES.len()])
                .with_location(if j % 3 == 0 { "Remote" } else { "Berlin" })
                .with_technologies([
                    TECHNOLOGIES[(i + j) % TECHNOLOGIES.len()],
                    TECHNOLOGIES[(i * 3 + j) % TECHNOLOGIES.len()],
                ])
        })
        .collect();
    ListingPage::new(format!("https://jobs.bench/{i}"), jobs)
}

fn bench_lru_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_get");

    for capacity in [64usize, 1_024, 16_384] {
        let cache = LruTtlCache::new(capacity, Duration::from_secs(3_600));
        for i in 0..capacity {
            cache.set(i, i * 2);
        }
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("hit", capacity), &capacity, |b, &cap| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 7) % cap;
                black_box(cache.get(&i))
            });
        });

        group.bench_with_input(BenchmarkId::new("miss", capacity), &capacity, |b, &cap| {
            let mut i = cap;
            b.iter(|| {
                i += 1;
                black_box(cache.get(&i))
            });
        });
    }

    group.finish();
}

fn bench_lru_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_eviction");

    for capacity in [64usize, 4_096] {
        group.bench_with_input(
            BenchmarkId::new("insert_past_capacity", capacity),
            &capacity,
            |b, &cap| {
                let cache = LruTtlCache::new(cap, Duration::from_secs(3_600));
                let mut i = 0usize;
                b.iter(|| {
                    i += 1;
                    cache.set(i, format!("value-{i}"));
                });
                black_box(cache.stats());
            },
        );
    }

    group.finish();
}

fn bench_index_search(c: &mut Criterion) {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return;
        },
    };
    let temp = match TempDir::new() {
        Ok(temp) => temp,
        Err(e) => {
            eprintln!("Failed to create temp dir: {e}");
            return;
        },
    };

    let cache = rt.block_on(async {
        let cache: CompressedCache<ListingPage> =
            CompressedCache::open(CacheConfig::new(temp.path())).await?;
        for i in 0..500 {
            let page = create_listing(i);
            cache.set(&page.source_url.clone(), page).await?;
        }
        Ok::<_, gleaner_core::Error>(Arc::new(cache))
    });
    let cache = match cache {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Failed to populate cache: {e}");
            return;
        },
    };

    let mut group = c.benchmark_group("index_search");
    group.measurement_time(Duration::from_secs(10));

    let queries = [
        ("single_company", SearchCriteria::default().company("acme")),
        (
            "company_and_technology",
            SearchCriteria::default().company("globex").technology("rust"),
        ),
        (
            "union_with_limit",
            SearchCriteria::default()
                .technology("rust")
                .technology("go")
                .limit(25),
        ),
    ];

    for (name, criteria) in &queries {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(cache.index().search(black_box(criteria))));
        });
    }

    group.bench_function("top_technologies", |b| {
        b.iter(|| black_box(cache.index().top_technologies(5)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lru_get,
    bench_lru_eviction,
    bench_index_search
);
criterion_main!(benches);
