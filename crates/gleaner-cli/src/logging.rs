//! Logging initialization and color control.

use anyhow::Result;
use colored::control as color_control;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::Cli;

/// Install the global subscriber for the selected verbosity.
///
/// JSON output drops to ERROR unless `--verbose` was given, so stdout stays
/// parseable and stderr quiet.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let machine_output = cli.output_format().is_machine_readable();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet || machine_output {
        Level::ERROR
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let env_no_color = std::env::var_os("NO_COLOR").is_some();
    if cli.no_color || env_no_color || machine_output {
        color_control::set_override(false);
    }
    Ok(())
}
