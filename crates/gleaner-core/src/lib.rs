//! # gleaner-core
//!
//! Infrastructure for long-running collection runs that fetch expensive,
//! slowly-changing pages and the job records extracted from them.
//!
//! The crate keeps repeated runs fast and resilient by avoiding redundant
//! fetches and redundant creation of expensive page handles.
//!
//! ## Architecture
//!
//! - **LRU-TTL cache** ([`lru`]): generic bounded in-process cache with
//!   recency eviction and absolute expiry
//! - **Cache index** ([`index`]): searchable metadata and inverted indices over
//!   cached payloads, persisted as an atomic JSON snapshot
//! - **Compressed cache** ([`cache`]): durable gzip store keyed by request
//!   fingerprint, indexing every write
//! - **Connection pool** ([`pool`]): bounded set of reusable resources with
//!   health-based recycling
//! - **Pipeline** ([`pipeline`]): the cache-first fetch flow tying them together
//!
//! Every component is an explicitly constructed value; callers own its
//! lifecycle and pass it to whatever needs it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gleaner_core::{CacheConfig, CompressedCache, JobRecord, ListingPage, SearchCriteria};
//!
//! # async fn demo() -> gleaner_core::Result<()> {
//! let cache: CompressedCache<ListingPage> =
//!     CompressedCache::open(CacheConfig::new("/tmp/gleaner")).await?;
//!
//! let page = ListingPage::new(
//!     "https://jobs.example.com/search?q=rust",
//!     vec![JobRecord::new("Backend Engineer").with_company("Acme")],
//! );
//! cache.set(&page.source_url, page.clone()).await?;
//!
//! let hits = cache.index().search(&SearchCriteria::default().company("acme"));
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Storage and resource failures degrade to cache misses or recreated
//! resources. What reaches callers is an [`Error`]; only
//! [`Error::PoolExhausted`] is expected in normal operation:
//!
//! ```rust,no_run
//! # use gleaner_core::{ConnectionPool, Error};
//! # async fn demo<F: gleaner_core::pool::ResourceFactory>(pool: ConnectionPool<F>) {
//! match pool.acquire(std::time::Duration::from_secs(5)).await {
//!     Ok(lease) => pool.release(lease, false).await,
//!     Err(e @ Error::PoolExhausted { .. }) => eprintln!("retry later: {e}"),
//!     Err(e) => eprintln!("fatal: {e}"),
//! }
//! # }
//! ```

/// Compressed durable cache
pub mod cache;
/// Injectable time source
pub mod clock;
/// Cache and pool configuration
pub mod config;
/// Error types and result aliases
pub mod error;
/// Search index over cached metadata
pub mod index;
/// Generic LRU cache with TTL expiry
pub mod lru;
/// Cached payload types and metadata extraction
pub mod payload;
/// Cache-first fetch flow
pub mod pipeline;
/// Resource pool
pub mod pool;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheKey, CacheStats, CompressedCache, SweepReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, Config, PoolConfig};
pub use error::{Error, Result};
pub use index::{CacheIndex, IndexEntry, IndexStats, SearchCriteria, TermCount};
pub use lru::{LruStats, LruTtlCache};
pub use payload::{EntryMetadata, JobRecord, ListingPage, Payload};
pub use pipeline::{FetchOutcome, Fetcher, Pipeline};
pub use pool::{ConnectionPool, Lease, PoolStats};
