//! Error types and handling for gleaner-core operations.
//!
//! Errors are grouped by the subsystem that raises them and carry a hint about
//! whether a retry might succeed. Most failures inside the pool and the cache
//! are handled locally (a broken resource is recreated, an unreadable cache
//! line is treated as a miss); the variants below are what escapes to callers.
//!
//! ## Error Categories
//!
//! - **I/O and storage**: reading or writing a single cache entry
//! - **Index**: snapshot persistence and corruption of the cache index
//! - **Serialization / compression**: encoding a payload for durable storage
//! - **Pool**: resource creation, reset, exhaustion and shutdown
//! - **Configuration**: invalid settings or unreadable config files
//!
//! ```rust
//! use gleaner_core::Error;
//! use std::time::Duration;
//!
//! let err = Error::PoolExhausted { timeout: Duration::from_secs(1) };
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "pool");
//! ```

use std::time::Duration;

use thiserror::Error;

/// The main error type for gleaner-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// The underlying `std::io::Error` is preserved. Timeouts and interruptions
    /// are considered recoverable.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a single cache entry failed.
    ///
    /// The affected entry is treated as absent; the cache itself stays usable.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cache index operation failed.
    ///
    /// Covers snapshot persistence failures. The in-memory index remains
    /// authoritative until the next successful save.
    #[error("Index error: {0}")]
    Index(String),

    /// The persisted index snapshot could not be parsed.
    ///
    /// The snapshot is discarded and rebuilt from the entry files.
    #[error("Index snapshot corrupted: {0}")]
    IndexCorruption(String),

    /// Serialization or deserialization failed.
    ///
    /// A payload that cannot be encoded is never written, so it stays absent
    /// from the cache.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compressing or decompressing an entry failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The resource factory failed to create a new resource.
    ///
    /// Subsequent acquire attempts retry creation.
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// A pooled resource could not be reset to a clean state.
    ///
    /// The resource is destroyed instead of being handed out.
    #[error("Resource reset failed: {0}")]
    ResourceReset(String),

    /// No resource became available before the acquire timeout elapsed.
    #[error("Connection pool exhausted after waiting {timeout:?}")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        timeout: Duration,
    },

    /// The pool has been shut down and no longer hands out resources.
    #[error("Connection pool is shut down")]
    PoolShutdown,

    /// Requested entry was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Pool exhaustion, resource churn and single-entry storage failures are
    /// transient: waiting and retrying, or simply refetching, is expected to
    /// work. Configuration and corruption problems are not.
    ///
    /// ```rust
    /// use gleaner_core::Error;
    ///
    /// assert!(Error::ResourceCreation("browser crashed".into()).is_recoverable());
    /// assert!(!Error::Config("max_size must be positive".into()).is_recoverable());
    /// assert!(!Error::PoolShutdown.is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PoolExhausted { .. }
            | Self::ResourceCreation(_)
            | Self::ResourceReset(_)
            | Self::Storage(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier.
    ///
    /// Useful as a structured logging field:
    ///
    /// ```rust
    /// use gleaner_core::Error;
    ///
    /// let err = Error::IndexCorruption("unexpected EOF".into());
    /// tracing::warn!(category = err.category(), "{err}");
    /// ```
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Storage(_) => "storage",
            Self::Index(_) | Self::IndexCorruption(_) => "index",
            Self::Serialization(_) => "serialization",
            Self::Compression(_) => "compression",
            Self::Config(_) => "config",
            Self::ResourceCreation(_)
            | Self::ResourceReset(_)
            | Self::PoolExhausted { .. }
            | Self::PoolShutdown => "pool",
            Self::NotFound(_) => "not_found",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
