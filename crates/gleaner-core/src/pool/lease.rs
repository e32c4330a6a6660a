//! Exclusive handle to a pooled resource.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::resource::{PooledResource, Resource, ResourceFactory};
use super::stats::Counters;
use super::Inner;

/// A resource checked out of a [`ConnectionPool`](super::ConnectionPool).
///
/// Dereferences to the resource. Hand it back with
/// [`ConnectionPool::release`](super::ConnectionPool::release) (or
/// [`Lease::release`]). A lease dropped without being released is treated
/// as broken: the resource is closed, its slot freed, and the pool topped
/// back up to `min_size` in the background.
pub struct Lease<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
    slot: Option<PooledResource<F::Resource>>,
}

impl<F: ResourceFactory> Lease<F> {
    pub(super) fn new(inner: Arc<Inner<F>>, pooled: PooledResource<F::Resource>) -> Self {
        Self {
            inner,
            slot: Some(pooled),
        }
    }

    fn pooled(&self) -> &PooledResource<F::Resource> {
        match &self.slot {
            Some(pooled) => pooled,
            None => unreachable!("lease slot is only emptied when the lease is consumed"),
        }
    }

    /// Pool-unique resource id.
    pub fn id(&self) -> u64 {
        self.pooled().id
    }

    /// Times the resource has been handed out, including this one.
    pub fn usage_count(&self) -> u64 {
        self.pooled().usage_count
    }

    /// Errors reported against the resource so far.
    pub fn error_count(&self) -> u32 {
        self.pooled().error_count
    }

    /// When the resource was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.pooled().created_at
    }

    /// Return the resource to its pool.
    pub async fn release(mut self, had_error: bool) {
        if let Some(pooled) = self.slot.take() {
            self.inner.release(pooled, had_error).await;
        }
    }
}

impl<F: ResourceFactory> Deref for Lease<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        &self.pooled().resource
    }
}

impl<F: ResourceFactory> DerefMut for Lease<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.slot {
            Some(pooled) => &mut pooled.resource,
            None => unreachable!("lease slot is only emptied when the lease is consumed"),
        }
    }
}

impl<F: ResourceFactory> std::fmt::Debug for Lease<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.slot.as_ref().map(|p| p.id))
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFactory> Drop for Lease<F> {
    fn drop(&mut self) {
        let Some(mut pooled) = self.slot.take() else {
            return;
        };
        warn!(resource_id = pooled.id, "Lease dropped without release; destroying resource");
        self.inner.forget_busy(pooled.id);
        Counters::bump(&self.inner.counters.destroyed);

        // close() is async; without a runtime the resource is simply dropped
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move {
                pooled.resource.close().await;
                inner.top_up().await;
            });
        }
    }
}
