//! Top companies and technologies

use anyhow::Result;
use colored::Colorize;
use gleaner_core::{Config, TermCount};

use super::open_cache;
use crate::cli::TopDimension;
use crate::output::{OutputFormat, format_number, print_json};

/// Execute the top command
pub async fn execute(
    config: Config,
    dimension: TopDimension,
    count: usize,
    format: OutputFormat,
) -> Result<()> {
    let cache = open_cache(config).await?;
    let ranked = match dimension {
        TopDimension::Companies => cache.index().top_companies(count),
        TopDimension::Technologies => cache.index().top_technologies(count),
    };

    match format {
        OutputFormat::Json => print_json(&ranked)?,
        OutputFormat::Text => print_ranked(&ranked),
    }
    Ok(())
}

fn print_ranked(ranked: &[TermCount]) {
    if ranked.is_empty() {
        println!("Index is empty");
        return;
    }

    let width = ranked.iter().map(|t| t.term.len()).max().unwrap_or(0);
    for (position, term) in ranked.iter().enumerate() {
        println!(
            "{:>3}. {:<width$}  {} records in {} entries",
            position + 1,
            term.term.bold(),
            format_number(term.records),
            term.entries
        );
    }
}
