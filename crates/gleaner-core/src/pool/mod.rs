//! Bounded pool of expensive, reusable resources.
//!
//! [`ConnectionPool`] hands out [`Lease`]s over resources produced by a
//! [`ResourceFactory`]. It keeps at least `min_size` resources alive, never
//! more than `max_size`, and retires resources that are too old, too heavily
//! used, or have exhausted their error budget.
//!
//! ## Locking
//!
//! All membership bookkeeping (available queue, busy set, slots reserved for
//! in-flight creations) lives behind one mutex that is never held across an
//! `.await`. Candidates are selected under the lock; `reset`, `create` and
//! `close` run with the lock released; the result is committed with a second
//! brief lock. If the acquiring future is dropped mid-flight, a guard puts a
//! resource that was being reset back into the queue and releases a slot
//! reserved for a creation, so a cancelled `acquire` leaves the pool as it
//! found it.
//!
//! ## Invariants
//!
//! - `available + busy + reserved <= max_size` at all times
//! - a resource id is in at most one of `available` and `busy`
//!
//! ```rust,no_run
//! use gleaner_core::pool::{ConnectionPool, Resource, ResourceFactory};
//! use gleaner_core::{PoolConfig, Result};
//! use std::time::Duration;
//!
//! struct Session;
//!
//! #[async_trait::async_trait]
//! impl Resource for Session {
//!     async fn reset(&mut self) -> Result<()> { Ok(()) }
//!     async fn close(&mut self) {}
//! }
//!
//! struct Sessions;
//!
//! #[async_trait::async_trait]
//! impl ResourceFactory for Sessions {
//!     type Resource = Session;
//!     async fn create(&self) -> Result<Session> { Ok(Session) }
//! }
//!
//! # async fn demo() -> Result<()> {
//! let pool = ConnectionPool::initialize(Sessions, PoolConfig::default()).await?;
//! let lease = pool.acquire(Duration::from_secs(5)).await?;
//! // ... use the session ...
//! pool.release(lease, false).await;
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod lease;
mod resource;
mod stats;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use lease::Lease;
pub use resource::{RecycleReason, Resource, ResourceFactory};
pub use stats::PoolStats;

use crate::clock::{Clock, system_clock};
use crate::config::PoolConfig;
use crate::{Error, Result};
use resource::PooledResource;
use stats::Counters;

struct PoolState<R> {
    available: VecDeque<PooledResource<R>>,
    busy: HashSet<u64>,
    /// Slots held by creations in flight.
    reserved: usize,
    operational: bool,
}

impl<R> PoolState<R> {
    fn live(&self) -> usize {
        self.available.len() + self.busy.len() + self.reserved
    }
}

struct Inner<F: ResourceFactory> {
    factory: F,
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PoolState<F::Resource>>,
    notify: Notify,
    counters: Counters,
    next_id: AtomicU64,
}

/// Room reserved for a creation in flight.
///
/// Gives the slot back if the creation fails or the future holding it is
/// dropped.
struct SlotGuard<'a, F: ResourceFactory> {
    inner: &'a Inner<F>,
    armed: bool,
}

impl<'a, F: ResourceFactory> SlotGuard<'a, F> {
    /// Wrap a slot already counted in `reserved`.
    const fn new(inner: &'a Inner<F>) -> Self {
        Self { inner, armed: true }
    }

    /// Turn the slot into a busy entry for `id`. `false` if the pool shut down.
    fn commit_busy(mut self, id: u64) -> bool {
        self.armed = false;
        let mut state = self.inner.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        if state.operational {
            state.busy.insert(id);
        }
        state.operational
    }

    /// Park a fresh resource in the available queue.
    ///
    /// Hands the resource back if the pool shut down meanwhile.
    fn commit_available(
        mut self,
        pooled: PooledResource<F::Resource>,
    ) -> Option<PooledResource<F::Resource>> {
        self.armed = false;
        let orphan = {
            let mut state = self.inner.state.lock();
            state.reserved = state.reserved.saturating_sub(1);
            if state.operational {
                state.available.push_back(pooled);
                None
            } else {
                Some(pooled)
            }
        };
        self.inner.notify.notify_one();
        orphan
    }
}

impl<F: ResourceFactory> Drop for SlotGuard<'_, F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            state.reserved = state.reserved.saturating_sub(1);
        }
        self.inner.notify.notify_one();
    }
}

/// An idle resource taken off the queue to be reset for a caller.
///
/// Its id sits in `busy` while the reset runs. Dropping the checkout before
/// [`commit`](Self::commit) or [`discard`](Self::discard) puts the resource
/// back at the front of the queue, so an acquire cancelled mid-reset loses
/// nothing; after shutdown the resource is closed instead.
struct Checkout<'a, F: ResourceFactory> {
    inner: &'a Inner<F>,
    pooled: Option<PooledResource<F::Resource>>,
}

impl<'a, F: ResourceFactory> Checkout<'a, F> {
    const fn new(inner: &'a Inner<F>, pooled: PooledResource<F::Resource>) -> Self {
        Self {
            inner,
            pooled: Some(pooled),
        }
    }

    fn take(&mut self) -> PooledResource<F::Resource> {
        match self.pooled.take() {
            Some(pooled) => pooled,
            None => unreachable!("checkout is consumed at most once"),
        }
    }

    async fn reset(&mut self) -> Result<()> {
        match self.pooled.as_mut() {
            Some(pooled) => pooled.resource.reset().await,
            None => unreachable!("checkout is consumed at most once"),
        }
    }

    /// Hand the resource out, or back as `Err` if the pool shut down meanwhile.
    fn commit(
        mut self,
    ) -> std::result::Result<PooledResource<F::Resource>, PooledResource<F::Resource>> {
        let pooled = self.take();
        let mut state = self.inner.state.lock();
        if state.operational {
            Ok(pooled)
        } else {
            state.busy.remove(&pooled.id);
            Err(pooled)
        }
    }

    /// Give up the resource for destruction and free its slot.
    fn discard(mut self) -> PooledResource<F::Resource> {
        let pooled = self.take();
        self.inner.state.lock().busy.remove(&pooled.id);
        self.inner.notify.notify_one();
        pooled
    }
}

impl<F: ResourceFactory> Drop for Checkout<'_, F> {
    fn drop(&mut self) {
        let Some(pooled) = self.pooled.take() else {
            return;
        };
        debug!(
            resource_id = pooled.id,
            "Acquire cancelled during reset; returning resource"
        );
        let orphan = {
            let mut state = self.inner.state.lock();
            state.busy.remove(&pooled.id);
            if state.operational {
                state.available.push_front(pooled);
                None
            } else {
                Some(pooled)
            }
        };
        self.inner.notify.notify_one();

        if let Some(mut pooled) = orphan {
            Counters::bump(&self.inner.counters.destroyed);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    pooled.resource.close().await;
                });
            }
        }
    }
}

enum Step<R> {
    Reuse(PooledResource<R>),
    Create,
    Wait,
}

enum Returned<R> {
    Idle,
    Retire(PooledResource<R>, RecycleReason, bool),
    Close(PooledResource<R>),
}

impl<F: ResourceFactory> Inner<F> {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn create_resource(&self) -> Result<PooledResource<F::Resource>> {
        match self.factory.create().await {
            Ok(resource) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                Counters::bump(&self.counters.created);
                debug!(resource_id = id, "Created pooled resource");
                Ok(PooledResource::new(id, resource, self.now()))
            },
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(category = e.category(), "Failed to create pooled resource: {e}");
                Err(Error::ResourceCreation(e.to_string()))
            },
        }
    }

    async fn destroy(&self, mut pooled: PooledResource<F::Resource>, reason: &str) {
        debug!(resource_id = pooled.id, reason, "Destroying pooled resource");
        pooled.resource.close().await;
        Counters::bump(&self.counters.destroyed);
    }

    /// Create into a reserved slot; `true` if a resource became available.
    async fn fill(&self, guard: SlotGuard<'_, F>) -> bool {
        let Ok(pooled) = self.create_resource().await else {
            return false;
        };
        match guard.commit_available(pooled) {
            None => true,
            Some(orphan) => {
                self.destroy(orphan, "pool shut down").await;
                false
            },
        }
    }

    /// Create resources until the pool holds `min_size`, returning how many were made.
    async fn top_up(&self) -> usize {
        let attempts = {
            let state = self.state.lock();
            self.config.min_size.saturating_sub(state.live())
        };
        let mut created = 0;
        for _ in 0..attempts {
            let reserved = {
                let mut state = self.state.lock();
                let below_min = state.live() < self.config.min_size;
                if state.operational && below_min {
                    state.reserved += 1;
                }
                state.operational && below_min
            };
            if !reserved {
                break;
            }
            if self.fill(SlotGuard::new(self)).await {
                created += 1;
            }
        }
        created
    }

    /// One pass over the available queue: hand out a healthy resource, create
    /// one if there is room, or report that the caller must wait.
    async fn try_acquire(&self) -> Result<Option<PooledResource<F::Resource>>> {
        loop {
            let (step, retired) = {
                let mut state = self.state.lock();
                if !state.operational {
                    return Err(Error::PoolShutdown);
                }
                let now = self.now();
                let mut retired = Vec::new();
                let mut candidate = None;
                while let Some(pooled) = state.available.pop_front() {
                    if let Some(reason) = pooled.recycle_reason(now, &self.config) {
                        retired.push((pooled, reason));
                    } else {
                        state.busy.insert(pooled.id);
                        candidate = Some(pooled);
                        break;
                    }
                }
                let step = match candidate {
                    Some(pooled) => Step::Reuse(pooled),
                    None if state.live() < self.config.max_size => {
                        state.reserved += 1;
                        Step::Create
                    },
                    None => Step::Wait,
                };
                (step, retired)
            };

            // Guard the slot before the first await
            let (checkout, reservation) = match step {
                Step::Reuse(pooled) => (Some(Checkout::new(self, pooled)), None),
                Step::Create => (None, Some(SlotGuard::new(self))),
                Step::Wait => (None, None),
            };

            for (pooled, reason) in retired {
                self.destroy(pooled, reason.as_str()).await;
            }

            if let Some(mut checkout) = checkout {
                match checkout.reset().await {
                    Ok(()) => match checkout.commit() {
                        Ok(mut pooled) => {
                            pooled.usage_count += 1;
                            pooled.last_used = self.now();
                            Counters::bump(&self.counters.hits);
                            return Ok(Some(pooled));
                        },
                        Err(pooled) => {
                            self.destroy(pooled, "pool shut down").await;
                            return Err(Error::PoolShutdown);
                        },
                    },
                    Err(e) => {
                        Counters::bump(&self.counters.errors);
                        let pooled = checkout.discard();
                        warn!(resource_id = pooled.id, "Resource reset failed: {e}");
                        self.destroy(pooled, "reset failed").await;
                        continue;
                    },
                }
            }

            let Some(guard) = reservation else {
                return Ok(None);
            };
            let Ok(mut pooled) = self.create_resource().await else {
                return Ok(None);
            };
            if !guard.commit_busy(pooled.id) {
                self.destroy(pooled, "pool shut down").await;
                return Err(Error::PoolShutdown);
            }
            pooled.usage_count = 1;
            Counters::bump(&self.counters.misses);
            return Ok(Some(pooled));
        }
    }

    async fn release(&self, mut pooled: PooledResource<F::Resource>, had_error: bool) {
        let now = self.now();
        pooled.last_used = now;
        if had_error {
            pooled.error_count += 1;
            Counters::bump(&self.counters.errors);
        }

        let returned = {
            let mut state = self.state.lock();
            state.busy.remove(&pooled.id);
            if !state.operational {
                Returned::Close(pooled)
            } else if let Some(reason) = pooled.recycle_reason(now, &self.config) {
                let refill = state.live() < self.config.min_size;
                if refill {
                    state.reserved += 1;
                }
                Returned::Retire(pooled, reason, refill)
            } else {
                debug!(resource_id = pooled.id, "Resource returned to pool");
                state.available.push_back(pooled);
                Returned::Idle
            }
        };
        self.notify.notify_one();

        match returned {
            Returned::Idle => {},
            Returned::Close(pooled) => self.destroy(pooled, "pool shut down").await,
            Returned::Retire(pooled, reason, refill) => {
                let guard = refill.then(|| SlotGuard::new(self));
                self.destroy(pooled, reason.as_str()).await;
                if let Some(guard) = guard {
                    self.fill(guard).await;
                }
            },
        }
    }

    fn forget_busy(&self, id: u64) {
        self.state.lock().busy.remove(&id);
        self.notify.notify_one();
    }

    /// Retire unhealthy idle resources and top back up to `min_size`.
    async fn maintain(&self) {
        let retired = {
            let mut state = self.state.lock();
            if !state.operational {
                return;
            }
            let now = self.now();
            let mut retired = Vec::new();
            for pooled in std::mem::take(&mut state.available) {
                match pooled.recycle_reason(now, &self.config) {
                    Some(reason) => retired.push((pooled, reason)),
                    None => state.available.push_back(pooled),
                }
            }
            retired
        };

        let removed = retired.len();
        for (pooled, reason) in retired {
            self.destroy(pooled, reason.as_str()).await;
        }
        let created = self.top_up().await;
        if removed > 0 || created > 0 {
            debug!(removed, created, "Pool maintenance pass");
        }
    }
}

fn spawn_maintenance<F: ResourceFactory>(inner: Weak<Inner<F>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.maintain().await;
        }
    })
}

/// Bounded pool of resources created by `F`.
pub struct ConnectionPool<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ResourceFactory> ConnectionPool<F> {
    /// Create the pool, pre-create `min_size` resources and start maintenance.
    ///
    /// Creation failures are logged and leave a smaller pool; only an
    /// impossible configuration is an error.
    pub async fn initialize(factory: F, config: PoolConfig) -> Result<Self> {
        Self::initialize_with_clock(factory, config, system_clock()).await
    }

    /// [`initialize`](Self::initialize) with an explicit clock for resource ages.
    pub async fn initialize_with_clock(
        factory: F,
        config: PoolConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.max_size == 0 {
            return Err(Error::Config("pool.max_size must be at least 1".into()));
        }
        if config.min_size > config.max_size {
            return Err(Error::Config(format!(
                "pool.min_size ({}) exceeds pool.max_size ({})",
                config.min_size, config.max_size
            )));
        }
        if config.maintenance_interval_secs == 0 {
            return Err(Error::Config("pool.maintenance_interval_secs must be non-zero".into()));
        }

        let inner = Arc::new(Inner {
            factory,
            config,
            clock,
            state: Mutex::new(PoolState {
                available: VecDeque::new(),
                busy: HashSet::new(),
                reserved: 0,
                operational: true,
            }),
            notify: Notify::new(),
            counters: Counters::default(),
            next_id: AtomicU64::new(1),
        });

        let created = inner.top_up().await;
        if created < inner.config.min_size {
            warn!(
                created,
                min_size = inner.config.min_size,
                "Pool started below its minimum size"
            );
        }
        let handle = spawn_maintenance(Arc::downgrade(&inner), inner.config.maintenance_interval());
        info!(
            size = created,
            min_size = inner.config.min_size,
            max_size = inner.config.max_size,
            "Connection pool initialized"
        );

        Ok(Self {
            inner,
            maintenance: Mutex::new(Some(handle)),
        })
    }

    /// Check out a resource, waiting up to `timeout` for one to free up.
    ///
    /// Returns [`Error::PoolExhausted`] when the wait runs out and
    /// [`Error::PoolShutdown`] once the pool is shut down. The timeout bounds
    /// the waiting; a reset or creation already under way is allowed to finish.
    pub async fn acquire(&self, timeout: Duration) -> Result<Lease<F>> {
        let started = Instant::now();
        let deadline = started + timeout;
        Counters::bump(&self.inner.counters.requests);

        let result = loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.inner.try_acquire().await {
                Ok(Some(pooled)) => break Ok(Lease::new(Arc::clone(&self.inner), pooled)),
                Ok(None) => {},
                Err(e) => break Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                Counters::bump(&self.inner.counters.exhausted);
                warn!(?timeout, "Connection pool exhausted");
                break Err(Error::PoolExhausted { timeout });
            }
            let wait = (deadline - now).min(self.inner.config.retry_interval());
            let _ = tokio::time::timeout(wait, notified).await;
        };

        self.inner.counters.add_wait(started.elapsed());
        result
    }

    /// Return a leased resource. Flag `had_error` if the caller's work failed.
    ///
    /// A resource past its recycle limits is destroyed; if that leaves the
    /// pool below `min_size` a replacement is created before returning.
    pub async fn release(&self, lease: Lease<F>, had_error: bool) {
        lease.release(had_error).await;
    }

    /// Stop maintenance, close idle resources and refuse further acquires.
    ///
    /// Resources still leased are closed when they are released or dropped.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }

        let (idle, busy) = {
            let mut state = self.inner.state.lock();
            if !state.operational {
                return;
            }
            state.operational = false;
            let idle: Vec<_> = state.available.drain(..).collect();
            (idle, state.busy.len())
        };
        self.inner.notify.notify_waiters();

        let closed = idle.len();
        for pooled in idle {
            self.inner.destroy(pooled, "shutdown").await;
        }
        info!(closed, busy, "Connection pool shut down");
    }

    /// Run one maintenance pass now.
    pub async fn run_maintenance(&self) {
        self.inner.maintain().await;
    }

    /// Counters and current occupancy.
    pub fn stats(&self) -> PoolStats {
        let (available, busy) = {
            let state = self.inner.state.lock();
            (state.available.len(), state.busy.len())
        };
        self.inner.counters.snapshot(available, busy)
    }

    /// Live resources, idle plus leased.
    pub fn size(&self) -> usize {
        let state = self.inner.state.lock();
        state.available.len() + state.busy.len()
    }

    /// `false` once [`shutdown`](Self::shutdown) has run.
    pub fn is_operational(&self) -> bool {
        self.inner.state.lock().operational
    }

    /// Configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<F: ResourceFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
    }
}

impl<F: ResourceFactory> std::fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("size", &self.size())
            .field("operational", &self.is_operational())
            .finish_non_exhaustive()
    }
}
