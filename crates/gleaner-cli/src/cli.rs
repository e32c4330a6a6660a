//! # CLI Structure and Argument Parsing
//!
//! `gleaner` works on a cache directory written by a collection run. Every
//! command opens the cache described by the effective configuration:
//!
//! ```bash
//! gleaner stats
//! gleaner search --company acme --tech rust --limit 5
//! gleaner top technologies -n 10 --format json
//! gleaner --cache-dir /tmp/run-42 sweep
//! gleaner get "https://jobs.example.com/search?q=rust"
//! gleaner config
//! ```
//!
//! Configuration comes from `--config` (or `GLEANER_CONFIG`), then the
//! `GLEANER_*` environment overrides, then `--cache-dir`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::FormatArg;

/// Top-level `gleaner` command line.
#[derive(Parser, Clone, Debug)]
#[command(name = "gleaner")]
#[command(version)]
#[command(about = "gleaner - inspect and maintain job-listing caches", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable all ANSI colors in output (also respects `NO_COLOR` env)
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Path to configuration file. Also via `GLEANER_CONFIG`.
    #[arg(long, global = true, value_name = "FILE", env = "GLEANER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory, overriding the configuration
    #[arg(long = "cache-dir", global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Show index totals and compression figures
    Stats {
        #[command(flatten)]
        format: FormatArg,
    },

    /// Find cached listings by company, technology, location or date
    Search(SearchArgs),

    /// Rank companies or technologies by listed records
    Top {
        /// Dimension to rank
        #[arg(value_enum)]
        dimension: TopDimension,

        /// Number of terms to show
        #[arg(short = 'n', long = "count", default_value_t = 10)]
        count: usize,

        #[command(flatten)]
        format: FormatArg,
    },

    /// Rebuild the index from the entry files on disk
    Rebuild {
        #[command(flatten)]
        format: FormatArg,
    },

    /// Delete expired and unreadable entry files
    Sweep {
        #[command(flatten)]
        format: FormatArg,
    },

    /// Print the cached listing for a source URL or query
    Get {
        /// Source URL or search query the listing was fetched for
        source_id: String,

        #[command(flatten)]
        format: FormatArg,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        format: FormatArg,
    },
}

/// Filters for `gleaner search`.
#[derive(Args, Clone, Debug, Default)]
pub struct SearchArgs {
    /// Company name (repeatable, any may match)
    #[arg(long = "company", value_name = "NAME")]
    pub companies: Vec<String>,

    /// Technology (repeatable, any may match)
    #[arg(long = "tech", value_name = "NAME")]
    pub technologies: Vec<String>,

    /// Location (repeatable, any may match)
    #[arg(long = "location", value_name = "NAME")]
    pub locations: Vec<String>,

    /// Only entries written on or after this date (YYYY-MM-DD, UTC)
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Only entries written on or before this date (YYYY-MM-DD, UTC)
    #[arg(long, value_name = "DATE")]
    pub until: Option<NaiveDate>,

    /// Minimum number of job records
    #[arg(long, value_name = "N")]
    pub min_records: Option<usize>,

    /// Minimum uncompressed size in bytes
    #[arg(long = "min-size", value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Maximum number of results
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub format: FormatArg,
}

/// Dimension ranked by `gleaner top`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TopDimension {
    /// Companies
    Companies,
    /// Technologies
    Technologies,
}

impl Cli {
    /// Format requested by the selected command.
    pub const fn output_format(&self) -> crate::output::OutputFormat {
        match &self.command {
            Commands::Stats { format }
            | Commands::Top { format, .. }
            | Commands::Rebuild { format }
            | Commands::Sweep { format }
            | Commands::Get { format, .. }
            | Commands::Config { format } => format.format,
            Commands::Search(args) => args.format.format,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_flags() {
        let cli = Cli::try_parse_from([
            "gleaner",
            "search",
            "--company",
            "Acme",
            "--company",
            "Globex",
            "--tech",
            "rust",
            "--since",
            "2024-06-01",
            "--limit",
            "5",
            "--format",
            "json",
        ])
        .unwrap();

        let Commands::Search(args) = &cli.command else {
            unreachable!("parsed a different command");
        };
        assert_eq!(args.companies, vec!["Acme", "Globex"]);
        assert_eq!(args.technologies, vec!["rust"]);
        assert_eq!(args.since, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(args.limit, Some(5));
        assert_eq!(cli.output_format(), OutputFormat::Json);
    }

    #[test]
    fn test_top_defaults() {
        let cli = Cli::try_parse_from(["gleaner", "top", "technologies"]).unwrap();
        let Commands::Top {
            dimension, count, ..
        } = cli.command
        else {
            unreachable!("parsed a different command");
        };
        assert_eq!(dimension, TopDimension::Technologies);
        assert_eq!(count, 10);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["gleaner", "stats", "--cache-dir", "/tmp/run", "-q"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/run")));
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        assert!(Cli::try_parse_from(["gleaner", "search", "--since", "yesterday"]).is_err());
    }
}
