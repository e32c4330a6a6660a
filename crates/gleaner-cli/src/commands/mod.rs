//! Command implementations for the gleaner CLI

mod config;
mod get;
mod rebuild;
mod search;
mod stats;
mod sweep;
mod top;

use std::path::Path;

use anyhow::{Context, Result};
use gleaner_core::{CompressedCache, Config, ListingPage};

pub use config::execute as show_config;
pub use get::execute as get;
pub use rebuild::execute as rebuild;
pub use search::execute as search;
pub use stats::execute as show_stats;
pub use sweep::execute as sweep;
pub use top::execute as show_top;

/// Effective configuration: file, then environment, then `--cache-dir`.
pub fn resolve_config(config_path: Option<&Path>, cache_dir: Option<&Path>) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => {
            let mut config = Config::load_or_default(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        },
        None => Config::load()?,
    };

    if let Some(dir) = cache_dir {
        config.cache.dir = dir.to_path_buf();
    }

    config.validate()?;
    Ok(config)
}

/// Open the listing cache described by `config`.
pub async fn open_cache(config: Config) -> Result<CompressedCache<ListingPage>> {
    let dir = config.cache.dir.clone();
    CompressedCache::open(config.cache)
        .await
        .with_context(|| format!("Failed to open cache at {}", dir.display()))
}
