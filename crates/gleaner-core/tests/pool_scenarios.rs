//! End-to-end pool behavior under contention.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gleaner_core::pool::{ConnectionPool, Resource, ResourceFactory};
use gleaner_core::{Error, PoolConfig, Result};
use tokio::time::Instant;

#[derive(Default)]
struct Census {
    live: AtomicUsize,
    peak: AtomicUsize,
}

struct Handle {
    census: Arc<Census>,
}

#[async_trait]
impl Resource for Handle {
    async fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {
        self.census.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Handles(Arc<Census>);

#[async_trait]
impl ResourceFactory for Handles {
    type Resource = Handle;

    async fn create(&self) -> Result<Handle> {
        // simulate a slow browser launch
        tokio::time::sleep(Duration::from_millis(20)).await;
        let live = self.0.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Handle {
            census: Arc::clone(&self.0),
        })
    }
}

async fn pool(min: usize, max: usize) -> (Arc<ConnectionPool<Handles>>, Arc<Census>) {
    let census = Arc::new(Census::default());
    let config = PoolConfig {
        min_size: min,
        max_size: max,
        ..PoolConfig::default()
    };
    let pool = ConnectionPool::initialize(Handles(Arc::clone(&census)), config)
        .await
        .unwrap();
    (Arc::new(pool), census)
}

#[tokio::test(start_paused = true)]
async fn five_concurrent_acquires_on_a_pool_of_four() {
    // Given: min 2, max 4
    let (pool, census) = pool(2, 4).await;
    assert_eq!(pool.size(), 2);

    // When: five callers acquire with a 1s timeout and nobody releases
    let started = Instant::now();
    let attempts = (0..5).map(|_| {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let outcome = pool.acquire(Duration::from_secs(1)).await;
            (outcome, started.elapsed())
        })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // Then: four succeed, the fifth is exhausted after about a second
    let (ok, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|(r, _)| r.is_ok());
    assert_eq!(ok.len(), 4);
    assert_eq!(failed.len(), 1);

    let (err, waited) = &failed[0];
    assert!(matches!(err, Err(Error::PoolExhausted { .. })));
    assert!(*waited >= Duration::from_secs(1));
    assert!(*waited < Duration::from_millis(1200));

    assert_eq!(census.peak.load(Ordering::SeqCst), 4);
    let stats = pool.stats();
    assert_eq!(stats.busy, 4);
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.requests, 5);
}

#[tokio::test(start_paused = true)]
async fn churn_never_exceeds_max_size() {
    let (pool, census) = pool(1, 3).await;

    let workers = (0..12u64).map(|i| {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            for round in 0..5u64 {
                let lease = pool.acquire(Duration::from_secs(30)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5 + (i * round) % 7)).await;
                pool.release(lease, (i + round) % 4 == 0).await;
            }
        })
    });
    for joined in futures::future::join_all(workers).await {
        joined.unwrap();
    }

    assert!(census.peak.load(Ordering::SeqCst) <= 3);
    let stats = pool.stats();
    assert_eq!(stats.busy, 0);
    assert!(stats.available <= 3);
    assert_eq!(stats.requests, 60);
    assert_eq!(stats.hits + stats.misses, 60);
}

#[tokio::test(start_paused = true)]
async fn released_resource_serves_the_next_acquire() {
    let (pool, census) = pool(1, 1).await;

    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    let id = lease.id();
    pool.release(lease, false).await;

    let next = pool.acquire(Duration::from_secs(1)).await.unwrap();
    assert_eq!(next.id(), id);
    assert_eq!(census.live.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_wakes_waiters() {
    let (pool, census) = pool(1, 1).await;
    let held = pool.acquire(Duration::from_secs(1)).await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire(Duration::from_secs(60)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.shutdown().await;

    let outcome = waiter.await.unwrap();
    assert!(matches!(outcome, Err(Error::PoolShutdown)));

    pool.release(held, false).await;
    assert_eq!(census.live.load(Ordering::SeqCst), 0);
}
