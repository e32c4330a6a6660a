//! Bounded in-process cache with LRU eviction and absolute TTL expiry.
//!
//! [`LruTtlCache`] combines two independent expiry mechanisms:
//!
//! - **Capacity**: inserting past `max_size` evicts the least-recently-used entry.
//! - **Time**: an entry older than `ttl` (measured from its last `set`) is never
//!   returned; it is dropped on the read that discovers it, or by the
//!   opportunistic sweep that runs roughly every `ttl / 2` on `get`/`set`.
//!
//! Recency is tracked with an index-linked list stored in a slab, so every
//! operation is O(1) apart from the periodic sweep. All state lives behind a
//! single mutex; a lookup's check-then-promote happens in one critical section.
//!
//! ```rust
//! use gleaner_core::lru::LruTtlCache;
//! use std::time::Duration;
//!
//! let cache = LruTtlCache::new(2, Duration::from_secs(60));
//! cache.set("a", 1);
//! cache.set("b", 2);
//! cache.set("c", 3); // evicts "a"
//! assert_eq!(cache.get("a"), None);
//! assert_eq!(cache.get("c"), Some(3));
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, system_clock};

/// Metadata for a single cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// When the value was inserted or last refreshed by `set`.
    pub inserted_at: DateTime<Utc>,
    /// Number of successful `get` calls that returned this value.
    pub access_count: u64,
    /// Time of the most recent successful `get` (or the insert time).
    pub last_access: DateTime<Utc>,
}

/// Point-in-time statistics for an [`LruTtlCache`].
#[derive(Debug, Clone, Serialize)]
pub struct LruStats {
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing, or found an expired value.
    pub misses: u64,
    /// Entries removed to stay within capacity.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Calls to `set`, including refreshes of existing keys.
    pub inserts: u64,
    /// Completed expiry sweeps.
    pub cleanups: u64,
    /// Entries currently stored (may include expired, not yet swept entries).
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub hit_rate: f64,
    /// Mean wall time spent inside `get`.
    pub avg_access_latency: Duration,
}

struct Node<K, V> {
    key: K,
    value: V,
    info: EntryInfo,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    inserts: u64,
    cleanups: u64,
    lookup_nanos: u128,
}

struct LruState<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    last_cleanup: DateTime<Utc>,
    counters: Counters,
}

impl<K, V> LruState<K, V>
where
    K: Hash + Eq + Clone,
{
    fn new(capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            map: HashMap::with_capacity(capacity.min(1024)),
            slots: Vec::with_capacity(capacity.min(1024)),
            free: Vec::new(),
            head: None,
            tail: None,
            last_cleanup: now,
            counters: Counters::default(),
        }
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|n| (n.prev, n.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            },
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.node_mut(h) {
                    node.prev = Some(idx);
                }
            },
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.detach(idx);
            self.attach_front(idx);
        }
    }

    fn insert_front(&mut self, key: K, value: V, now: DateTime<Utc>) {
        let node = Node {
            key: key.clone(),
            value,
            info: EntryInfo {
                inserted_at: now,
                access_count: 0,
                last_access: now,
            },
            prev: None,
            next: None,
        };
        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        };
        self.map.insert(key, idx);
        self.attach_front(idx);
    }

    fn remove_slot(&mut self, idx: usize) -> Option<Node<K, V>> {
        self.detach(idx);
        let node = self.slots.get_mut(idx).and_then(Option::take)?;
        self.map.remove(&node.key);
        self.free.push(idx);
        Some(node)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
        let expired: Vec<usize> = self
            .map
            .values()
            .copied()
            .filter(|&idx| {
                self.node(idx)
                    .is_some_and(|n| now - n.info.inserted_at > ttl)
            })
            .collect();

        for &idx in &expired {
            self.remove_slot(idx);
        }
        self.counters.expirations += expired.len() as u64;
        expired.len()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }
}

/// Generic bounded cache with least-recently-used eviction and TTL expiry.
pub struct LruTtlCache<K, V> {
    state: Mutex<LruState<K, V>>,
    max_size: usize,
    ttl: TimeDelta,
    cleanup_interval: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl<K, V> LruTtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_size` entries for at most `ttl` each.
    ///
    /// A `max_size` of zero is treated as one.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_clock(max_size, ttl, system_clock())
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(max_size: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let max_size = max_size.max(1);
        let ttl = TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(365 * 100));
        let now = clock.now();
        Self {
            state: Mutex::new(LruState::new(max_size, now)),
            max_size,
            ttl,
            cleanup_interval: ttl / 2,
            clock,
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let started = Instant::now();
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.maybe_cleanup(&mut state, now);

        let result = match state.map.get(key).copied() {
            None => {
                state.counters.misses += 1;
                None
            },
            Some(idx) => {
                let expired = state
                    .node(idx)
                    .is_some_and(|n| now - n.info.inserted_at > self.ttl);
                if expired {
                    state.remove_slot(idx);
                    state.counters.expirations += 1;
                    state.counters.misses += 1;
                    None
                } else {
                    state.promote(idx);
                    state.counters.hits += 1;
                    state.node_mut(idx).map(|node| {
                        node.info.access_count += 1;
                        node.info.last_access = now;
                        node.value.clone()
                    })
                }
            },
        };

        state.counters.lookup_nanos += started.elapsed().as_nanos();
        result
    }

    /// Read a live value without touching recency or statistics.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let state = self.state.lock();
        let idx = *state.map.get(key)?;
        state
            .node(idx)
            .filter(|n| now - n.info.inserted_at <= self.ttl)
            .map(|n| n.value.clone())
    }

    /// Recency and access metadata for a live entry.
    pub fn entry_info<Q>(&self, key: &Q) -> Option<EntryInfo>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let state = self.state.lock();
        let idx = *state.map.get(key)?;
        state
            .node(idx)
            .filter(|n| now - n.info.inserted_at <= self.ttl)
            .map(|n| n.info)
    }

    /// Whether a live (unexpired) entry exists for `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entry_info(key).is_some()
    }

    /// Insert or refresh `key`.
    ///
    /// Refreshing resets the entry's TTL clock and promotes it. Inserting a new
    /// key past capacity evicts the least-recently-used entry.
    pub fn set(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.maybe_cleanup(&mut state, now);
        state.counters.inserts += 1;

        if let Some(idx) = state.map.get(&key).copied() {
            if let Some(node) = state.node_mut(idx) {
                node.value = value;
                node.info.inserted_at = now;
            }
            state.promote(idx);
            return;
        }

        state.insert_front(key, value, now);
        while state.map.len() > self.max_size {
            let Some(tail) = state.tail else { break };
            state.remove_slot(tail);
            state.counters.evictions += 1;
        }
    }

    /// Remove `key`, returning its value if it was present.
    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.state.lock();
        let idx = state.map.get(key).copied()?;
        state.remove_slot(idx).map(|node| node.value)
    }

    /// Remove every entry. Statistics are kept.
    pub fn clear(&self) {
        self.state.lock().clear();
    }

    /// Remove all expired entries now, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let removed = state.purge_expired(now, self.ttl);
        state.last_cleanup = now;
        state.counters.cleanups += 1;
        removed
    }

    /// Number of stored entries, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> LruStats {
        let state = self.state.lock();
        let c = &state.counters;
        let lookups = c.hits + c.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups > 0 {
            c.hits as f64 / lookups as f64
        } else {
            0.0
        };
        let avg_nanos = if lookups > 0 {
            c.lookup_nanos / u128::from(lookups)
        } else {
            0
        };
        LruStats {
            hits: c.hits,
            misses: c.misses,
            evictions: c.evictions,
            expirations: c.expirations,
            inserts: c.inserts,
            cleanups: c.cleanups,
            size: state.map.len(),
            max_size: self.max_size,
            hit_rate,
            avg_access_latency: Duration::from_nanos(
                u64::try_from(avg_nanos).unwrap_or(u64::MAX),
            ),
        }
    }

    fn maybe_cleanup(&self, state: &mut LruState<K, V>, now: DateTime<Utc>) {
        if now - state.last_cleanup < self.cleanup_interval {
            return;
        }
        let removed = state.purge_expired(now, self.ttl);
        state.last_cleanup = now;
        state.counters.cleanups += 1;
        if removed > 0 {
            debug!(removed, "Swept expired LRU entries");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn manual_cache(max: usize, ttl_secs: u64) -> (LruTtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = LruTtlCache::with_clock(max, Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_basic_set_get() {
        let (cache, _) = manual_cache(4, 60);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (cache, _) = manual_cache(3, 60);
        for (i, key) in ["k1", "k2", "k3", "k4"].iter().enumerate() {
            cache.set((*key).to_string(), u32::try_from(i).unwrap());
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.get("k2"), Some(1));
        assert_eq!(cache.get("k3"), Some(2));
        assert_eq!(cache.get("k4"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_promotes_entry() {
        let (cache, _) = manual_cache(2, 60);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        // "a" becomes most recent, so "b" is the next victim
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c".to_string(), 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_set_existing_key_refreshes_and_promotes() {
        let (cache, clock) = manual_cache(2, 60);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        clock.advance(TimeDelta::seconds(50));
        cache.set("a".to_string(), 10);
        cache.set("c".to_string(), 3);

        assert_eq!(cache.get("b"), None);

        // The refresh restarted the TTL for "a"
        clock.advance(TimeDelta::seconds(30));
        assert_eq!(cache.get("a"), Some(10));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (cache, clock) = manual_cache(10, 60);
        cache.set("a".to_string(), 1);

        clock.advance(TimeDelta::seconds(60));
        assert_eq!(cache.get("a"), Some(1), "exactly ttl old is still live");

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_opportunistic_cleanup_removes_write_only_keys() {
        let (cache, clock) = manual_cache(100, 60);
        for i in 0..10 {
            cache.set(format!("write-only-{i}"), i);
        }

        clock.advance(TimeDelta::seconds(61));
        // Any access after ttl/2 triggers a sweep
        cache.set("fresh".to_string(), 99);

        assert_eq!(cache.len(), 1);
        let stats = cache.stats();
        assert_eq!(stats.expirations, 10);
        assert!(stats.cleanups >= 1);
    }

    #[test]
    fn test_access_tracking() {
        let (cache, clock) = manual_cache(4, 600);
        cache.set("a".to_string(), 1);
        clock.advance(TimeDelta::seconds(5));
        cache.get("a");
        cache.get("a");

        let info = cache.entry_info("a").unwrap();
        assert_eq!(info.access_count, 2);
        assert_eq!(info.last_access - info.inserted_at, TimeDelta::seconds(5));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let (cache, _) = manual_cache(2, 60);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        assert_eq!(cache.peek("a"), Some(1));
        cache.set("c".to_string(), 3);

        assert!(!cache.contains("a"));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _) = manual_cache(4, 60);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        assert_eq!(cache.delete("a"), Some(1));
        assert_eq!(cache.delete("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());

        // Slots are reusable after clear
        cache.set("c".to_string(), 3);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache: LruTtlCache<u32, u32> = LruTtlCache::new(0, Duration::from_secs(60));
        cache.set(1, 1);
        cache.set(2, 2);
        assert_eq!(cache.max_size(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(2));
    }

    proptest! {
        #[test]
        fn test_size_never_exceeds_capacity(
            max in 1usize..16,
            ops in prop::collection::vec((0u8..3, 0u32..32), 1..200)
        ) {
            let cache: LruTtlCache<u32, u32> = LruTtlCache::new(max, Duration::from_secs(3600));
            for (op, key) in ops {
                match op {
                    0 => cache.set(key, key),
                    1 => { cache.get(&key); },
                    _ => { cache.delete(&key); },
                }
                prop_assert!(cache.len() <= max);
            }
        }

        #[test]
        fn test_n_plus_one_inserts_keep_most_recent(n in 1usize..32) {
            let cache: LruTtlCache<usize, usize> = LruTtlCache::new(n, Duration::from_secs(3600));
            for key in 0..=n {
                cache.set(key, key);
            }
            prop_assert_eq!(cache.get(&0), None);
            for key in 1..=n {
                prop_assert_eq!(cache.get(&key), Some(key));
            }
        }
    }
}
