//! gleaner CLI - inspect and maintain a job-listing cache directory
//!
//! Each command lives in its own module under [`commands`].

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::initialize_logging(&cli)?;

    execute_command(cli).await
}

async fn execute_command(cli: Cli) -> Result<()> {
    let config = commands::resolve_config(cli.config.as_deref(), cli.cache_dir.as_deref())?;

    match cli.command {
        Commands::Stats { format } => commands::show_stats(config, format.format).await,
        Commands::Search(args) => commands::search(config, &args).await,
        Commands::Top {
            dimension,
            count,
            format,
        } => commands::show_top(config, dimension, count, format.format).await,
        Commands::Rebuild { format } => commands::rebuild(config, format.format).await,
        Commands::Sweep { format } => commands::sweep(config, format.format).await,
        Commands::Get { source_id, format } => {
            commands::get(config, &source_id, format.format).await
        },
        Commands::Config { format } => commands::show_config(&config, format.format),
    }
}
