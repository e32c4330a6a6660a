//! Pool counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Calls to `acquire`.
    pub requests: u64,
    /// Acquires served by reusing an existing resource.
    pub hits: u64,
    /// Acquires served by creating a resource.
    pub misses: u64,
    /// Resources created.
    pub created: u64,
    /// Resources destroyed.
    pub destroyed: u64,
    /// Creation failures, reset failures and releases flagged with an error.
    pub errors: u64,
    /// Acquires that timed out.
    pub exhausted: u64,
    /// Total time callers spent inside `acquire`.
    pub total_wait: Duration,
    /// Idle resources.
    pub available: usize,
    /// Resources handed out.
    pub busy: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub requests: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub created: AtomicU64,
    pub destroyed: AtomicU64,
    pub errors: AtomicU64,
    pub exhausted: AtomicU64,
    pub wait_nanos: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_wait(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.wait_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self, available: usize, busy: usize) -> PoolStats {
        PoolStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            total_wait: Duration::from_nanos(self.wait_nanos.load(Ordering::Relaxed)),
            available,
            busy,
        }
    }
}
