//! Index search command implementation

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use colored::Colorize;
use gleaner_core::{Config, IndexEntry, SearchCriteria};

use super::open_cache;
use crate::cli::SearchArgs;
use crate::output::{OutputFormat, format_size, join_or_dash, print_json};

/// Execute the search command
pub async fn execute(config: Config, args: &SearchArgs) -> Result<()> {
    let cache = open_cache(config).await?;
    let criteria = criteria_from(args);
    let hits = cache.index().search(&criteria);

    match args.format.format {
        OutputFormat::Json => print_json(&hits)?,
        OutputFormat::Text => print_text_hits(&hits),
    }
    Ok(())
}

fn criteria_from(args: &SearchArgs) -> SearchCriteria {
    SearchCriteria {
        companies: args.companies.clone(),
        technologies: args.technologies.clone(),
        locations: args.locations.clone(),
        min_records: args.min_records,
        min_raw_size: args.min_size,
        limit: args.limit,
        ..SearchCriteria::default()
    }
    .between(args.since.map(start_of_day), args.until.map(end_of_day))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.succ_opt().map_or(DateTime::<Utc>::MAX_UTC, |next| {
        start_of_day(next) - chrono::TimeDelta::nanoseconds(1)
    })
}

fn print_text_hits(hits: &[IndexEntry]) {
    if hits.is_empty() {
        println!("No matching entries");
        return;
    }

    for entry in hits {
        println!(
            "{}  {}",
            entry.written_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            entry.source_id.bold()
        );
        println!(
            "    {} records, {} | companies: {} | tech: {}",
            entry.metadata.record_count,
            format_size(entry.raw_size),
            join_or_dash(&entry.metadata.companies),
            join_or_dash(&entry.metadata.technologies)
        );
    }
    println!("\n{} entries", hits.len());
}
