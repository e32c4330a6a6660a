//! Collaborator traits for pooled resources and their bookkeeping wrapper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::config::PoolConfig;

/// An expensive, stateful handle managed by a [`ConnectionPool`](super::ConnectionPool).
#[async_trait]
pub trait Resource: Send + 'static {
    /// Return the handle to a clean, side-effect-free state before reuse.
    ///
    /// An error means the handle is unusable; the pool destroys it.
    async fn reset(&mut self) -> Result<()>;

    /// Release whatever the handle holds. Called once, before it is dropped.
    async fn close(&mut self);
}

/// Creates resources for a pool.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// Resource type produced.
    type Resource: Resource;

    /// Create a fresh resource.
    async fn create(&self) -> Result<Self::Resource>;
}

/// Why a resource was taken out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleReason {
    /// Older than `max_age_secs`.
    Expired,
    /// Used more than `max_uses` times.
    WornOut,
    /// Reached `error_budget` errors.
    Faulty,
}

impl RecycleReason {
    /// Short label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "max age",
            Self::WornOut => "usage cap",
            Self::Faulty => "error budget",
        }
    }
}

/// A resource plus the metadata the recycle policy needs.
pub(crate) struct PooledResource<R> {
    pub id: u64,
    pub resource: R,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub usage_count: u64,
    pub error_count: u32,
}

impl<R: Resource> PooledResource<R> {
    pub fn new(id: u64, resource: R, now: DateTime<Utc>) -> Self {
        Self {
            id,
            resource,
            created_at: now,
            last_used: now,
            usage_count: 0,
            error_count: 0,
        }
    }

    /// First recycle rule the resource violates, if any.
    pub fn recycle_reason(&self, now: DateTime<Utc>, config: &PoolConfig) -> Option<RecycleReason> {
        let age = now - self.created_at;
        if age.num_seconds() > i64::try_from(config.max_age_secs).unwrap_or(i64::MAX) {
            Some(RecycleReason::Expired)
        } else if self.usage_count > config.max_uses {
            Some(RecycleReason::WornOut)
        } else if self.error_count >= config.error_budget {
            Some(RecycleReason::Faulty)
        } else {
            None
        }
    }
}
