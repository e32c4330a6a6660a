//! Cache-first fetch orchestration.
//!
//! [`Pipeline::get_or_fetch`] answers from the [`CompressedCache`] when it
//! can. On a miss it leases a resource from the [`ConnectionPool`], runs the
//! [`Fetcher`], returns the resource (flagging failures so the pool can retire
//! it) and stores the result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Result;
use crate::cache::CompressedCache;
use crate::payload::Payload;
use crate::pool::{ConnectionPool, ResourceFactory};

/// Produces a payload for a source identifier using a pooled resource.
#[async_trait]
pub trait Fetcher<R: Send>: Send + Sync {
    /// Payload produced.
    type Output: Payload;

    /// Fetch `source_id` with `resource`.
    async fn fetch(&self, resource: &mut R, source_id: &str) -> Result<Self::Output>;
}

/// Where a payload came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<P> {
    /// Served from the cache.
    Cached(P),
    /// Fetched and then cached.
    Fetched(P),
}

impl<P> FetchOutcome<P> {
    /// Whether the cache answered.
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    /// The payload either way.
    pub fn into_inner(self) -> P {
        match self {
            Self::Cached(p) | Self::Fetched(p) => p,
        }
    }
}

/// Cache, pool and fetcher wired together.
pub struct Pipeline<F, X>
where
    F: ResourceFactory,
    X: Fetcher<F::Resource>,
{
    cache: Arc<CompressedCache<X::Output>>,
    pool: Arc<ConnectionPool<F>>,
    fetcher: X,
    acquire_timeout: Duration,
}

impl<F, X> Pipeline<F, X>
where
    F: ResourceFactory,
    X: Fetcher<F::Resource>,
{
    /// Build a pipeline using the pool's configured acquire timeout.
    pub fn new(
        cache: Arc<CompressedCache<X::Output>>,
        pool: Arc<ConnectionPool<F>>,
        fetcher: X,
    ) -> Self {
        let acquire_timeout = pool.config().acquire_timeout();
        Self {
            cache,
            pool,
            fetcher,
            acquire_timeout,
        }
    }

    /// Override how long a miss waits for a resource.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// The cache consulted first.
    pub const fn cache(&self) -> &Arc<CompressedCache<X::Output>> {
        &self.cache
    }

    /// The pool used on misses.
    pub const fn pool(&self) -> &Arc<ConnectionPool<F>> {
        &self.pool
    }

    /// Return the cached payload for `source_id`, fetching it on a miss.
    ///
    /// Fails with [`Error::PoolExhausted`](crate::Error::PoolExhausted) when
    /// no resource frees up in time, or with the fetcher's error. A failed
    /// cache write is logged and does not fail the call.
    pub async fn get_or_fetch(&self, source_id: &str) -> Result<FetchOutcome<X::Output>> {
        if let Some(payload) = self.cache.get(source_id).await {
            debug!(source_id, "Served from cache");
            return Ok(FetchOutcome::Cached(payload));
        }

        let mut lease = self.pool.acquire(self.acquire_timeout).await?;
        let fetched = self.fetcher.fetch(&mut *lease, source_id).await;
        self.pool.release(lease, fetched.is_err()).await;
        let payload = fetched?;

        if let Err(e) = self.cache.set(source_id, payload.clone()).await {
            warn!(source_id, "Fetched payload could not be cached: {e}");
        }
        Ok(FetchOutcome::Fetched(payload))
    }
}

impl<F, X> std::fmt::Debug for Pipeline<F, X>
where
    F: ResourceFactory,
    X: Fetcher<F::Resource>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}
