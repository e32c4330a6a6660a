//! Print the effective configuration

use anyhow::Result;
use gleaner_core::Config;

use crate::output::{OutputFormat, print_json};

/// Execute the config command
pub fn execute(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config)?,
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
