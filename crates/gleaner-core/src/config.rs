//! Configuration for the cache and the resource pool.
//!
//! Settings are stored as TOML and every section falls back to its defaults,
//! so a config file only needs to list the values it changes.
//!
//! ## Resolution order
//!
//! 1. `GLEANER_CONFIG` if set, otherwise `global.toml` in the platform config
//!    directory (`~/.config/gleaner/global.toml` on Linux)
//! 2. Built-in defaults when no file exists
//! 3. Environment overrides: `GLEANER_CACHE_DIR`, `GLEANER_CACHE_TTL_HOURS`,
//!    `GLEANER_POOL_MIN`, `GLEANER_POOL_MAX`
//!
//! Components do not validate the whole configuration themselves; call
//! [`Config::validate`] before constructing them.
//!
//! ```rust
//! use gleaner_core::Config;
//!
//! let config: Config = toml::from_str(
//!     r#"
//!     [cache]
//!     ttl_hours = 6
//!
//!     [pool]
//!     max_size = 8
//!     "#,
//! )?;
//! assert_eq!(config.cache.ttl_hours, 6);
//! assert_eq!(config.cache.compression_level, 6);
//! assert_eq!(config.pool.min_size, 2);
//! config.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GLEANER_CONFIG";

/// Complete gleaner configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compressed cache settings.
    pub cache: CacheConfig,
    /// Resource pool settings.
    pub pool: PoolConfig,
}

/// Settings for [`CompressedCache`](crate::CompressedCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding entry files and the index snapshot.
    pub dir: PathBuf,
    /// Maximum entry age in hours.
    pub ttl_hours: u64,
    /// Gzip level, 0 (store) to 9 (smallest).
    pub compression_level: u32,
    /// Capacity of the in-memory hot layer.
    pub hot_entries: usize,
}

impl CacheConfig {
    /// Defaults rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Entry time-to-live.
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_hours: 24,
            compression_level: 6,
            hot_entries: 256,
        }
    }
}

/// Settings for [`ConnectionPool`](crate::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Steady-state number of resources.
    pub min_size: usize,
    /// Hard cap on live resources (available + busy).
    pub max_size: usize,
    /// Resources older than this are recycled.
    pub max_age_secs: u64,
    /// Resources used more than this many times are recycled.
    pub max_uses: u64,
    /// Resources with this many errors are recycled.
    pub error_budget: u32,
    /// Period of the background health sweep.
    pub maintenance_interval_secs: u64,
    /// Default wait for [`ConnectionPool::acquire`](crate::ConnectionPool::acquire).
    pub acquire_timeout_secs: u64,
    /// Upper bound between availability checks while waiting.
    pub retry_interval_ms: u64,
}

impl PoolConfig {
    /// Maximum resource age.
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Maintenance sweep period.
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Default acquire timeout.
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Wait between availability checks.
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 4,
            max_age_secs: 1800,
            max_uses: 100,
            error_budget: 3,
            maintenance_interval_secs: 60,
            acquire_timeout_secs: 30,
            retry_interval_ms: 100,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    ///
    /// ```rust,no_run
    /// use gleaner_core::Config;
    ///
    /// let config = Config::load()?;
    /// config.validate()?;
    /// println!("Cache dir: {}", config.cache.dir.display());
    /// # Ok::<(), gleaner_core::Error>(())
    /// ```
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::config_path()?,
        };
        let mut config = Self::load_or_default(&path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load `path`, or the defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let content = self.to_toml()?;
        fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config: {e}")))
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))
    }

    /// Apply `GLEANER_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("GLEANER_CACHE_DIR").filter(|v| !v.trim().is_empty()) {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(ttl) = lookup("GLEANER_CACHE_TTL_HOURS") {
            self.cache.ttl_hours = parse_override("GLEANER_CACHE_TTL_HOURS", &ttl)?;
        }
        if let Some(min) = lookup("GLEANER_POOL_MIN") {
            self.pool.min_size = parse_override("GLEANER_POOL_MIN", &min)?;
        }
        if let Some(max) = lookup("GLEANER_POOL_MAX") {
            self.pool.max_size = parse_override("GLEANER_POOL_MAX", &max)?;
        }
        Ok(())
    }

    /// Reject settings no component can honour.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        let pool = &self.pool;
        let problem = if pool.max_size == 0 {
            Some("pool.max_size must be at least 1".to_string())
        } else if pool.min_size > pool.max_size {
            Some(format!(
                "pool.min_size ({}) exceeds pool.max_size ({})",
                pool.min_size, pool.max_size
            ))
        } else if cache.compression_level > 9 {
            Some(format!(
                "cache.compression_level must be 0-9, got {}",
                cache.compression_level
            ))
        } else if cache.ttl_hours == 0 {
            Some("cache.ttl_hours must be at least 1".to_string())
        } else if cache.hot_entries == 0 {
            Some("cache.hot_entries must be at least 1".to_string())
        } else if pool.error_budget == 0 {
            Some("pool.error_budget must be at least 1".to_string())
        } else if pool.maintenance_interval_secs == 0 || pool.retry_interval_ms == 0 {
            Some("pool intervals must be non-zero".to_string())
        } else {
            None
        };

        problem.map_or(Ok(()), |msg| Err(Error::Config(msg)))
    }

    /// Path of the global config file.
    ///
    /// - Linux: `~/.config/gleaner/global.toml`
    /// - macOS: `~/Library/Application Support/dev.gleaner.gleaner/global.toml`
    /// - Windows: `%APPDATA%\gleaner\gleaner\config\global.toml`
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("dev", "gleaner", "gleaner")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(project_dirs.config_dir().join("global.toml"))
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got '{value}'")))
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "gleaner", "gleaner").map_or_else(
        || {
            directories::BaseDirs::new().map_or_else(
                || PathBuf::from(".gleaner/cache"),
                |base| base.home_dir().join(".gleaner").join("cache"),
            )
        },
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.cache.ttl_hours, 24);
        assert_eq!(config.cache.compression_level, 6);
        assert_eq!(config.cache.ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.retry_interval(), Duration::from_millis(100));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[pool]\nmax_size = 10\n").unwrap();
        assert_eq!(config.pool.max_size, 10);
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(config.cache.hot_entries, 256);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        // Given: a customised config
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("global.toml");
        let mut original = Config::default();
        original.cache.dir = temp.path().join("cache");
        original.cache.ttl_hours = 2;
        original.pool.error_budget = 7;

        // When: saving and loading it back
        original.save_to(&path).unwrap();
        let loaded = Config::load_or_default(&path).unwrap();

        // Then: nothing is lost
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let loaded = Config::load_or_default(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        match Config::load_from(&path) {
            Err(Error::Config(msg)) => assert!(msg.contains("Failed to parse config")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("GLEANER_CACHE_DIR", "/srv/gleaner"),
                ("GLEANER_CACHE_TTL_HOURS", "1"),
                ("GLEANER_POOL_MIN", "0"),
                ("GLEANER_POOL_MAX", " 12 "),
            ]))
            .unwrap();

        assert_eq!(config.cache.dir, PathBuf::from("/srv/gleaner"));
        assert_eq!(config.cache.ttl_hours, 1);
        assert_eq!(config.pool.min_size, 0);
        assert_eq!(config.pool.max_size, 12);
    }

    #[test]
    fn test_malformed_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("GLEANER_POOL_MAX", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("GLEANER_POOL_MAX")));
    }

    #[test]
    fn test_validate_rejects_impossible_settings() {
        let cases: Vec<fn(&mut Config)> = vec![
            |c| c.pool.max_size = 0,
            |c| c.pool.min_size = 5,
            |c| c.cache.compression_level = 10,
            |c| c.cache.ttl_hours = 0,
            |c| c.cache.hot_entries = 0,
            |c| c.pool.error_budget = 0,
            |c| c.pool.maintenance_interval_secs = 0,
            |c| c.pool.retry_interval_ms = 0,
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "accepted {config:?}"
            );
        }
    }
}
