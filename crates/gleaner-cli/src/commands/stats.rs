//! Cache statistics command implementation

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use gleaner_core::{Config, IndexStats};
use serde::Serialize;

use super::open_cache;
use crate::output::{OutputFormat, format_number, format_size, print_json};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    cache_location: String,
    ttl_hours: u64,
    index: IndexStats,
    bytes_saved: u64,
    top_companies: Vec<String>,
    top_technologies: Vec<String>,
}

/// Execute the stats command
pub async fn execute(config: Config, format: OutputFormat) -> Result<()> {
    let ttl_hours = config.cache.ttl_hours;
    let cache = open_cache(config).await?;
    let index = cache.index();
    let stats = index.stats();

    let report = StatsReport {
        cache_location: cache.dir().display().to_string(),
        ttl_hours,
        bytes_saved: stats.bytes_saved(),
        top_companies: index.top_companies(3).into_iter().map(|t| t.term).collect(),
        top_technologies: index
            .top_technologies(3)
            .into_iter()
            .map(|t| t.term)
            .collect(),
        index: stats,
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_text_stats(&report),
    }
    Ok(())
}

fn print_text_stats(report: &StatsReport) {
    let stats = &report.index;
    println!("{}", "Gleaner Cache Statistics".bold());
    println!("========================");
    println!("Cache Location: {}", report.cache_location);
    println!("TTL: {} hours", report.ttl_hours);
    println!("Entries: {}", format_number(stats.total_entries));
    println!("Job Records: {}", format_number(stats.total_records));
    println!(
        "Size: {} raw, {} on disk ({} saved)",
        format_size(stats.total_raw_bytes),
        format_size(stats.total_compressed_bytes),
        format_size(report.bytes_saved).green()
    );
    println!(
        "Mean Compression Ratio: {:.2}",
        stats.mean_compression_ratio
    );

    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("Oldest Entry: {}", describe_age(oldest));
        println!("Newest Entry: {}", describe_age(newest));
    }
    if !report.top_companies.is_empty() {
        println!("Top Companies: {}", report.top_companies.join(", ").cyan());
    }
    if !report.top_technologies.is_empty() {
        println!(
            "Top Technologies: {}",
            report.top_technologies.join(", ").cyan()
        );
    }
}

fn describe_age(at: DateTime<Utc>) -> String {
    let hours = Utc::now().signed_duration_since(at).num_hours();
    let age = if hours < 24 {
        format!("{hours} hours ago")
    } else if hours < 48 {
        "1 day ago".to_string()
    } else {
        format!("{} days ago", hours / 24)
    };
    format!("{} ({age})", at.format("%Y-%m-%d %H:%M UTC"))
}
