#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use assert_cmd::Command;
use gleaner_core::{CacheConfig, CompressedCache, JobRecord, ListingPage};

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// `gleaner` isolated from the user's configuration and environment.
#[allow(dead_code)]
pub fn gleaner_cmd(cache_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gleaner"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("GLEANER_CONFIG", cache_dir.join("no-such-config.toml"));
    for name in [
        "GLEANER_CACHE_DIR",
        "GLEANER_CACHE_TTL_HOURS",
        "GLEANER_POOL_MIN",
        "GLEANER_POOL_MAX",
    ] {
        cmd.env_remove(name);
    }
    cmd.env("NO_COLOR", "1");
    cmd.arg("--cache-dir").arg(cache_dir);
    cmd
}

#[allow(dead_code)]
pub fn listing(url: &str, company: &str, techs: &[&str], jobs: usize) -> ListingPage {
    let jobs = (0..jobs)
        .map(|i| {
            JobRecord::new(format!("Engineer {i}"))
                .with_company(company)
                .with_location("Berlin")
                .with_technologies(techs.iter().copied())
        })
        .collect();
    ListingPage::new(url, jobs)
}

/// Write a small cache: Acme (rust, 3 jobs) and Globex (go + rust, 2 jobs).
#[allow(dead_code)]
pub async fn seed_cache(dir: &Path) {
    let cache: CompressedCache<ListingPage> = CompressedCache::open(CacheConfig::new(dir))
        .await
        .expect("cache should open");
    for page in [
        listing("https://jobs.test/acme", "Acme", &["rust"], 3),
        listing("https://jobs.test/globex", "Globex", &["go", "rust"], 2),
    ] {
        let url = page.source_url.clone();
        cache.set(&url, page).await.expect("seed write should succeed");
    }
}
