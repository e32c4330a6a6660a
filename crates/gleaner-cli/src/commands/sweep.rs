//! Expired entry sweep

use anyhow::Result;
use colored::Colorize;
use gleaner_core::Config;

use super::open_cache;
use crate::output::{OutputFormat, format_size, print_json};

/// Execute the sweep command
pub async fn execute(config: Config, format: OutputFormat) -> Result<()> {
    let cache = open_cache(config).await?;
    let report = cache.sweep_expired().await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!(
                "{} Swept {} files: {} expired, {} unreadable, {} freed",
                "✓".green(),
                report.scanned,
                report.expired,
                report.corrupt,
                format_size(report.bytes_freed)
            );
            if report.failed > 0 {
                println!(
                    "{} {} files could not be deleted",
                    "!".yellow(),
                    report.failed
                );
            }
        },
    }
    Ok(())
}
