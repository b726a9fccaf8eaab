//! Cache Store Module
//!
//! Main cache engine combining the key map with LRU tracking, age-based
//! expiration and failure-driven invalidation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::{CacheEntry, CacheStats, EntryArena, LruRecencyList, ResultHandle};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_task;

type Producer<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, std::result::Result<T, E>> + Send + Sync>;

// == Async Result Cache ==
/// A cache of pending and completed computations.
///
/// Concurrent lookups of one key share a single computation: the first
/// lookup invokes the producer and every later lookup receives a clone of
/// the same [`ResultHandle`], whether it is still pending or already
/// settled. A computation that fails is removed from the cache so the next
/// lookup starts a fresh one; a successful one stays until it expires, is
/// evicted, or is removed.
///
/// Cloning the cache yields another reference to the same entries.
///
/// Producers run while the cache is locked. They should only build their
/// future and must not call back into the same cache.
pub struct AsyncResultCache<K, T, E, A = ()> {
    inner: Arc<Mutex<Inner<K, T, E>>>,
    producer: Option<Producer<A, T, E>>,
    runtime: Option<Handle>,
}

impl<K, T, E> AsyncResultCache<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache without a default producer; use [`get_with`](Self::get_with).
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }
}

impl<K, T, E, A> AsyncResultCache<K, T, E, A>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a cache whose [`get`](Self::get) calls `producer` with the
    /// arguments supplied by the caller.
    pub fn with_producer<F, Fut>(config: CacheConfig, producer: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let producer: Producer<A, T, E> = Arc::new(move |args| producer(args).boxed());
        Self::build(config, Some(producer))
    }

    fn build(config: CacheConfig, producer: Option<Producer<A, T, E>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(config))),
            producer,
            runtime: None,
        }
    }

    /// Drives computations, completion observers and the sweep on `runtime`
    /// instead of the runtime current at each lookup.
    pub fn on_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    // == Get ==
    /// Returns the handle stored under `key`, creating it with the
    /// configured producer applied to `args` on a miss.
    ///
    /// # Errors
    /// - [`CacheError::MissingProducer`] if the cache has no producer
    /// - [`CacheError::NoRuntime`] if there is no runtime to drive the computation
    /// - [`CacheError::Destroyed`] after [`destroy`](Self::destroy)
    ///
    /// # Deadlocks
    /// The producer is called while the cache is locked. Calling back into
    /// this cache, or any clone of it, from the producer itself deadlocks;
    /// the future it returns may use the cache freely.
    pub fn get(&self, key: K, args: A) -> Result<ResultHandle<T, E>> {
        let producer = self.producer.as_ref().ok_or(CacheError::MissingProducer)?;
        self.get_with(key, move || producer(args))
    }

    /// Returns the handle stored under `key`, creating it with `producer`
    /// on a miss. `producer` takes precedence over any configured one.
    ///
    /// # Errors
    /// - [`CacheError::Destroyed`] after [`destroy`](Self::destroy)
    /// - [`CacheError::NoRuntime`] if there is no runtime to drive the computation
    ///
    /// # Deadlocks
    /// `producer` is called while the cache is locked and must not call
    /// back into this cache or any clone of it. The future it returns may.
    pub fn get_with<F, Fut>(&self, key: K, producer: F) -> Result<ResultHandle<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(CacheError::Destroyed);
        }
        let runtime = self.runtime()?;

        if let Some(handle) = inner.lookup(&key) {
            trace!(?key, "cache hit");
            return Ok(handle);
        }

        trace!(?key, "cache miss, invoking producer");
        inner.stats.record_miss();
        let handle = ResultHandle::new(producer());
        let serial = inner.insert(key.clone(), handle.clone());

        let sweep_period = inner.config.effective_sweep_period();
        if let Some(period) = sweep_period.filter(|_| inner.sweep.is_none()) {
            let weak = Arc::downgrade(&self.inner);
            inner.sweep = spawn_sweep_task(&runtime, period, move || {
                let inner = weak.upgrade()?;
                let removed = inner.lock().prune();
                Some(removed)
            });
        }
        inner.enforce_max_entries();
        drop(inner);

        // Drives the computation and drops the entry if it fails, unless the
        // key has been taken over by a newer entry in the meantime.
        let observed = handle.clone();
        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            if observed.await.is_err() {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().remove_if_entry(&key, serial);
                }
            }
        });

        Ok(handle)
    }

    // == Has ==
    /// Whether an unexpired entry exists under `key`. Does not count as a use.
    pub fn has(&self, key: &K) -> bool {
        self.inner.lock().has(key)
    }

    // == Size ==
    /// Prunes expired entries, then returns the number of entries.
    pub fn size(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.prune();
        inner.arena.len()
    }

    // == Remove ==
    /// Removes the entry under `key`, returning whether one existed.
    ///
    /// The computation itself keeps running.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).copied() {
            Some(slot) => {
                inner.remove_slot(slot);
                true
            }
            None => false,
        }
    }

    // == Clear ==
    /// Drops every entry and stops the background sweep.
    pub fn clear(&self) {
        self.inner.lock().teardown();
    }

    // == Prune ==
    /// Removes every expired entry, returning how many were removed.
    pub fn prune(&self) -> usize {
        self.inner.lock().prune()
    }

    // == Destroy ==
    /// Clears the cache for good; later lookups fail with [`CacheError::Destroyed`].
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.teardown();
        inner.destroyed = true;
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.arena.len());
        stats
    }

    /// Keys from least to most recently used. Empty unless `max_entries` is set.
    pub fn recency_order(&self) -> Vec<K> {
        let inner = self.inner.lock();
        let keys = match &inner.recency {
            Some(recency) => recency
                .iter_lru_to_mru(&inner.arena)
                .map(|slot| inner.arena[slot].key().clone())
                .collect(),
            None => Vec::new(),
        };
        keys
    }

    /// Whether a background sweep is currently scheduled.
    pub fn is_sweeping(&self) -> bool {
        self.inner.lock().sweep.is_some()
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.lock().config.clone()
    }

    fn runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.clone()),
            None => Handle::try_current().map_err(|_| CacheError::NoRuntime),
        }
    }
}

impl<K, T, E, A> Clone for AsyncResultCache<K, T, E, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            producer: self.producer.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<K, T, E, A> fmt::Debug for AsyncResultCache<K, T, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AsyncResultCache")
            .field("config", &inner.config)
            .field("entries", &inner.arena.len())
            .field("sweeping", &inner.sweep.is_some())
            .field("has_producer", &self.producer.is_some())
            .finish()
    }
}

// == Inner State ==
struct Inner<K, T, E> {
    config: CacheConfig,
    /// Key to arena slot
    entries: HashMap<K, usize>,
    arena: EntryArena<CacheEntry<K, ResultHandle<T, E>>>,
    /// Only present while entries exist and `max_entries` is set
    recency: Option<LruRecencyList>,
    sweep: Option<JoinHandle<()>>,
    stats: CacheStats,
    next_serial: u64,
    destroyed: bool,
}

impl<K, T, E> Inner<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            arena: EntryArena::new(),
            recency: None,
            sweep: None,
            stats: CacheStats::new(),
            next_serial: 0,
            destroyed: false,
        }
    }

    /// Returns the unexpired handle under `key`, marking it most recently used.
    fn lookup(&mut self, key: &K) -> Option<ResultHandle<T, E>> {
        let slot = *self.entries.get(key)?;
        if self.arena[slot].is_expired(self.config.max_age) {
            return None;
        }
        if let Some(recency) = self.recency.as_mut() {
            recency.touch(&mut self.arena, slot);
        }
        self.stats.record_hit();
        Some(self.arena[slot].handle().clone())
    }

    /// Stores a new entry under `key`, replacing any previous one, and
    /// returns its serial.
    fn insert(&mut self, key: K, handle: ResultHandle<T, E>) -> u64 {
        if let Some(stale) = self.entries.get(&key).copied() {
            self.unlink(stale);
        }

        let serial = self.next_serial;
        self.next_serial += 1;

        let slot = self.arena.insert(CacheEntry::new(key.clone(), handle, serial));
        self.entries.insert(key, slot);
        if self.config.max_entries.is_some() {
            self.recency
                .get_or_insert_with(LruRecencyList::new)
                .push_mru(&mut self.arena, slot);
        }
        serial
    }

    /// Evicts the least recently used entry if the bound is exceeded.
    fn enforce_max_entries(&mut self) {
        let Some(max) = self.config.max_entries else {
            return;
        };
        if self.arena.len() <= max.get() {
            return;
        }
        if let Some(lru) = self.recency.as_ref().and_then(LruRecencyList::peek_lru) {
            debug!(key = ?self.arena[lru].key(), "evicting least recently used entry");
            self.remove_slot(lru);
            self.stats.record_eviction();
        }
    }

    fn has(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|&slot| !self.arena[slot].is_expired(self.config.max_age))
    }

    /// Removes the entry under `key` only if it is still the one with `serial`.
    fn remove_if_entry(&mut self, key: &K, serial: u64) -> bool {
        match self.entries.get(key).copied() {
            Some(slot) if self.arena[slot].serial() == serial => {
                debug!(?key, "computation failed, invalidating entry");
                self.remove_slot(slot);
                self.stats.record_invalidation();
                true
            }
            _ => false,
        }
    }

    fn prune(&mut self) -> usize {
        let Some(max_age) = self.config.max_age else {
            return 0;
        };
        if self.arena.is_empty() {
            return 0;
        }

        let now = Instant::now();
        let expired: Vec<usize> = self
            .arena
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now, Some(max_age)))
            .map(|(slot, _)| slot)
            .collect();

        for &slot in &expired {
            self.remove_slot(slot);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "pruned expired entries");
            self.stats.record_expirations(expired.len());
        }
        expired.len()
    }

    /// Removes an entry; tears down auxiliary state once the cache is empty.
    fn remove_slot(&mut self, slot: usize) {
        self.unlink(slot);
        if self.arena.is_empty() {
            self.teardown();
        }
    }

    fn unlink(&mut self, slot: usize) -> Option<CacheEntry<K, ResultHandle<T, E>>> {
        if let Some(recency) = self.recency.as_mut() {
            recency.remove(&mut self.arena, slot);
        }
        let entry = self.arena.remove(slot)?;
        self.entries.remove(entry.key());
        Some(entry)
    }

    fn teardown(&mut self) {
        self.entries = HashMap::new();
        self.arena = EntryArena::new();
        self.recency = None;
        self.stop_sweep();
    }
}

impl<K, T, E> Inner<K, T, E> {
    fn stop_sweep(&mut self) {
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
            debug!("expiration sweep stopped");
        }
    }
}

impl<K, T, E> Drop for Inner<K, T, E> {
    fn drop(&mut self) {
        self.stop_sweep();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::time;

    type Cache = AsyncResultCache<&'static str, u32, String>;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn ok(value: u32) -> impl FnOnce() -> futures::future::Ready<std::result::Result<u32, String>> {
        move || futures::future::ready(Ok(value))
    }

    #[test]
    fn test_get_without_runtime_fails() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());
        let calls = AtomicUsize::new(0);

        let result = cache.get_with("a", || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(1))
        });

        assert_eq!(result.unwrap_err(), CacheError::NoRuntime);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!cache.has(&"a"));
    }

    #[test]
    fn test_get_on_configured_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let cache: Cache =
            AsyncResultCache::new(CacheConfig::default()).on_runtime(runtime.handle().clone());

        let handle = cache.get_with("a", ok(9)).unwrap();

        assert_eq!(runtime.block_on(handle), Ok(9));
        assert!(cache.has(&"a"));
    }

    #[tokio::test]
    async fn test_get_without_producer_fails() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());

        assert_eq!(cache.get("a", ()).unwrap_err(), CacheError::MissingProducer);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_get_with_configured_producer_applies_args() {
        let cache = AsyncResultCache::with_producer(CacheConfig::default(), |id: u32| async move {
            Ok::<_, String>(id * 10)
        });

        let handle = cache.get("user-4", 4).unwrap();
        assert_eq!(handle.await, Ok(40));

        // A hit ignores the arguments entirely.
        let again = cache.get("user-4", 5).unwrap();
        assert_eq!(again.await, Ok(40));
    }

    #[tokio::test]
    async fn test_override_producer_takes_precedence() {
        let cache = AsyncResultCache::with_producer(CacheConfig::default(), |_: ()| async {
            Ok::<u32, String>(1)
        });

        let handle = cache.get_with("a", ok(2)).unwrap();
        assert_eq!(handle.await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_expired_entry_keeps_count_exact() {
        let config = CacheConfig::default()
            .with_max_entries(5)
            .with_max_age(Duration::from_secs(1))
            .without_sweep();
        let cache: Cache = AsyncResultCache::new(config);

        let first = cache.get_with("a", ok(1)).unwrap();
        cache.get_with("b", ok(2)).unwrap();
        time::advance(Duration::from_secs(2)).await;

        let second = cache.get_with("a", ok(3)).unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(cache.stats().total_entries, 2);
        assert_eq!(cache.recency_order(), vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_lifecycle() {
        let config = CacheConfig::default()
            .with_max_age(Duration::from_secs(1))
            .with_sweep_period(Duration::from_secs(5));
        let cache: Cache = AsyncResultCache::new(config);
        assert!(!cache.is_sweeping());

        cache.get_with("a", ok(1)).unwrap();
        assert!(cache.is_sweeping());
        cache.get_with("b", ok(2)).unwrap();
        assert!(cache.is_sweeping());

        time::advance(Duration::from_secs(5)).await;
        settle().await;

        let stats = cache.stats();
        assert_eq!(stats.expirations, 2);
        assert_eq!(stats.total_entries, 0);
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_no_sweep_without_max_age_or_period() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());
        cache.get_with("a", ok(1)).unwrap();
        assert!(!cache.is_sweeping());

        let config = CacheConfig::default()
            .with_max_age(Duration::from_secs(1))
            .without_sweep();
        let cache: Cache = AsyncResultCache::new(config);
        cache.get_with("a", ok(1)).unwrap();
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_sweep_stops_on_remove_clear_and_destroy() {
        let config = CacheConfig::default().with_max_age(Duration::from_secs(60));
        let cache: Cache = AsyncResultCache::new(config);

        cache.get_with("a", ok(1)).unwrap();
        cache.get_with("b", ok(2)).unwrap();
        assert!(cache.remove(&"a"));
        assert!(cache.is_sweeping());
        assert!(cache.remove(&"b"));
        assert!(!cache.is_sweeping());

        cache.get_with("a", ok(1)).unwrap();
        assert!(cache.is_sweeping());
        cache.clear();
        assert!(!cache.is_sweeping());

        cache.get_with("a", ok(1)).unwrap();
        cache.destroy();
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_destroyed_cache_rejects_lookups() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());
        cache.get_with("a", ok(1)).unwrap();

        cache.destroy();
        cache.destroy();

        assert_eq!(cache.get_with("a", ok(1)).unwrap_err(), CacheError::Destroyed);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_destroyed_cache_without_runtime_reports_destroyed() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());
        cache.destroy();

        assert_eq!(cache.get_with("a", ok(1)).unwrap_err(), CacheError::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_max_age_keeps_entries() {
        let config = CacheConfig::default().with_max_age(Duration::MAX).without_sweep();
        let cache: Cache = AsyncResultCache::new(config);

        let first = cache.get_with("k", ok(1)).unwrap();
        time::advance(Duration::from_secs(3600)).await;

        assert!(cache.has(&"k"));
        let again = cache.get_with("k", ok(2)).unwrap();
        assert!(first.ptr_eq(&again));
        assert_eq!(cache.prune(), 0);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_sweep_period_skips_sweep() {
        let config = CacheConfig::default()
            .with_max_age(Duration::from_secs(1))
            .with_sweep_period(Duration::MAX);
        let cache: Cache = AsyncResultCache::new(config);

        cache.get_with("k", ok(1)).unwrap();
        cache.get_with("j", ok(2)).unwrap();
        assert!(!cache.is_sweeping());

        time::advance(Duration::from_secs(2)).await;
        assert!(!cache.has(&"k"));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_returned_future_may_use_the_cache() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());
        let inside = cache.clone();

        let handle = cache
            .get_with("a", move || async move {
                let seen = inside.has(&"a");
                Ok(u32::from(seen))
            })
            .unwrap();

        assert_eq!(handle.await, Ok(1));
    }

    #[tokio::test]
    async fn test_remove_missing_key() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default().with_max_entries(2));

        assert!(!cache.remove(&"nope"));
        cache.get_with("a", ok(1)).unwrap();
        assert!(!cache.remove(&"nope"));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_recency_list_dropped_when_emptied() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default().with_max_entries(3));

        cache.get_with("a", ok(1)).unwrap();
        assert!(cache.inner.lock().recency.is_some());

        cache.remove(&"a");
        let inner = cache.inner.lock();
        assert!(inner.recency.is_none());
        assert!(inner.entries.is_empty());
        assert!(inner.arena.is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_clear_is_harmless() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default());
        let (tx, rx) = oneshot::channel::<std::result::Result<u32, String>>();

        let handle = cache
            .get_with("a", move || async move { rx.await.unwrap_or(Err("dropped".into())) })
            .unwrap();
        cache.clear();
        tx.send(Err("boom".into())).unwrap();

        assert_eq!(handle.await, Err("boom".to_string()));
        settle().await;
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().invalidations, 0);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache: Cache = AsyncResultCache::new(CacheConfig::default().with_max_entries(1));

        cache.get_with("a", ok(1)).unwrap();
        cache.get_with("a", ok(1)).unwrap();
        cache.get_with("b", ok(2)).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.total_entries, 1);
    }
}
