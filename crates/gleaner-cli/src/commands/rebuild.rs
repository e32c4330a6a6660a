//! Index rebuild command implementation

use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use gleaner_core::{Config, ListingPage};
use serde::Serialize;

use super::open_cache;
use crate::output::{OutputFormat, print_json};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RebuildReport {
    entries: usize,
    records: usize,
    elapsed_ms: u128,
}

/// Execute the rebuild command
pub async fn execute(config: Config, format: OutputFormat) -> Result<()> {
    let cache = open_cache(config).await?;
    let started = Instant::now();
    let entries = cache
        .index()
        .rebuild::<ListingPage>(cache.dir())
        .await
        .context("Index rebuild failed")?;

    let report = RebuildReport {
        entries,
        records: cache.index().stats().total_records,
        elapsed_ms: started.elapsed().as_millis(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => println!(
            "{} Rebuilt index: {} entries, {} records ({}ms)",
            "✓".green(),
            report.entries,
            report.records,
            report.elapsed_ms
        ),
    }
    Ok(())
}
