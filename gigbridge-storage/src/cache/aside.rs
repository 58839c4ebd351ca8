//! Cache-aside orchestration with single-flight computation.
//!
//! [`CacheAside::get_or_compute`] checks the store, and on a miss runs the
//! supplied computation, writes the result back with a TTL and returns it.
//! Concurrent misses for the same key share one in-flight computation.
//!
//! The cache is never a correctness dependency: an unavailable store, a
//! failed write-back or an undecodable payload all degrade to computing the
//! value directly. Only an error from the computation itself reaches the
//! caller, and nothing is cached in that case.

use dashmap::{mapref::entry::Entry, DashMap};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::codec::CacheCodec;
use super::traits::{CacheStats, CacheStore};

/// Value returned by [`CacheAside::get_or_compute`], tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    value: T,
    from_cache: bool,
}

impl<T> Cached<T> {
    pub fn hit(value: T) -> Self {
        Self {
            value,
            from_cache: true,
        }
    }

    pub fn computed(value: T) -> Self {
        Self {
            value,
            from_cache: false,
        }
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
        Cached {
            value: f(self.value),
            from_cache: self.from_cache,
        }
    }
}

type SharedFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// One in-flight computation. `handle` holds a `SharedFlight<T, E>` for the
/// caller's concrete types. Once any waiter times out the flight is
/// `abandoned`: it stays registered so later misses join it instead of
/// starting another, and its result is never written back.
struct Flight {
    generation: u64,
    abandoned: Arc<AtomicBool>,
    handle: Box<dyn Any + Send + Sync>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    unavailable: AtomicU64,
    write_failures: AtomicU64,
    decode_failures: AtomicU64,
    compute_failures: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Cache-aside policy over a shared [`CacheStore`].
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
    inflight: Arc<DashMap<String, Flight>>,
    generation: Arc<AtomicU64>,
    counters: Arc<Counters>,
    compute_timeout: Duration,
}

impl CacheAside {
    pub fn new(store: Arc<dyn CacheStore>, compute_timeout: Duration) -> Self {
        Self {
            store,
            inflight: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(Counters::default()),
            compute_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn compute_timeout(&self) -> Duration {
        self.compute_timeout
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Number of computations currently in flight.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// `compute` runs at most once per miss across all concurrent callers of
    /// the same key. A caller that waits longer than the compute timeout
    /// stops waiting and runs `compute` itself, without writing the result
    /// back.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: Display + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(value) = self.read::<T>(key).await {
            return Ok(Cached::hit(value));
        }
        Counters::bump(&self.counters.misses);

        let compute = Arc::new(compute);
        let Some((abandoned, flight)) = self.join_or_start(key, ttl, Arc::clone(&compute)) else {
            // Key already in flight with a different value type.
            warn!(key = %key, "In-flight computation has a different type, computing directly");
            return self.compute_direct(key, compute.as_ref()).await;
        };

        match tokio::time::timeout(self.compute_timeout, flight).await {
            Ok(Ok(value)) => Ok(Cached::computed(value)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                Counters::bump(&self.counters.timeouts);
                warn!(
                    key = %key,
                    timeout_ms = self.compute_timeout.as_millis() as u64,
                    "Cache computation timed out, resolving directly without write-back"
                );
                abandoned.store(true, Ordering::Release);
                self.compute_direct(key, compute.as_ref()).await
            }
        }
    }

    /// Read and decode `key`. Every failure mode is a miss.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match CacheCodec::decode_typed::<T>(&raw) {
                Ok(value) => {
                    Counters::bump(&self.counters.hits);
                    debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    Counters::bump(&self.counters.decode_failures);
                    warn!(key = %key, error = %e, "Cached payload did not decode, treating as miss");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                if e.is_unavailable() {
                    Counters::bump(&self.counters.unavailable);
                }
                warn!(key = %key, error = %e, "Cache read failed, computing directly");
                None
            }
        }
    }

    fn join_or_start<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: Arc<F>,
    ) -> Option<(Arc<AtomicBool>, SharedFlight<T, E>)>
    where
        T: Serialize + Clone + Send + Sync + 'static,
        E: Display + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (abandoned, flight) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                let current = existing.get();
                let shared = current.handle.downcast_ref::<SharedFlight<T, E>>()?.clone();
                Counters::bump(&self.counters.coalesced);
                debug!(key = %key, "Joining in-flight computation");
                return Some((Arc::clone(&current.abandoned), shared));
            }
            Entry::Vacant(slot) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let abandoned = Arc::new(AtomicBool::new(false));
                let flight = self.flight(key, ttl, generation, Arc::clone(&abandoned), compute);
                slot.insert(Flight {
                    generation,
                    abandoned: Arc::clone(&abandoned),
                    handle: Box::new(flight.clone()),
                });
                (abandoned, flight)
            }
        };

        // Drive the computation to completion even if every waiter gives up,
        // so the map entry is always released.
        tokio::spawn(flight.clone().map(|_| ()));
        Some((abandoned, flight))
    }

    fn flight<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        generation: u64,
        abandoned: Arc<AtomicBool>,
        compute: Arc<F>,
    ) -> SharedFlight<T, E>
    where
        T: Serialize + Clone + Send + Sync + 'static,
        E: Display + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.to_string();
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let inflight = Arc::downgrade(&self.inflight);

        async move {
            let result = compute().await;
            match &result {
                Ok(_) if abandoned.load(Ordering::Acquire) => {
                    debug!(key = %key, "Late result after timeout, not cached");
                }
                Ok(value) => write_back(store.as_ref(), &counters, &key, value, ttl).await,
                Err(e) => {
                    Counters::bump(&counters.compute_failures);
                    error!(key = %key, error = %e, "Cache computation failed, nothing cached");
                }
            }
            if let Some(inflight) = inflight.upgrade() {
                inflight.remove_if(&key, |_, f| f.generation == generation);
            }
            result
        }
        .boxed()
        .shared()
    }

    async fn compute_direct<T, E, F, Fut>(&self, key: &str, compute: &F) -> Result<Cached<T>, E>
    where
        E: Display,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match compute().await {
            Ok(value) => Ok(Cached::computed(value)),
            Err(e) => {
                Counters::bump(&self.counters.compute_failures);
                error!(key = %key, error = %e, "Direct computation failed");
                Err(e)
            }
        }
    }

    /// Store `value` under `key`, logging instead of failing.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        write_back(self.store.as_ref(), &self.counters, key, value, ttl).await;
    }
}

async fn write_back<T: Serialize>(
    store: &dyn CacheStore,
    counters: &Counters,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    let encoded = match CacheCodec::encode_typed(value) {
        Ok(encoded) => encoded,
        Err(e) => {
            Counters::bump(&counters.write_failures);
            warn!(key = %key, error = %e, "Could not encode value for cache");
            return;
        }
    };
    if let Err(e) = store.set(key, &encoded, ttl).await {
        Counters::bump(&counters.write_failures);
        if e.is_unavailable() {
            Counters::bump(&counters.unavailable);
        }
        warn!(key = %key, error = %e, "Cache write-back failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use std::sync::atomic::AtomicUsize;

    fn aside(store: Arc<InMemoryCacheStore>) -> CacheAside {
        CacheAside::new(store, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = aside(Arc::clone(&store));

        let first = cache
            .get_or_compute("user:1", Duration::from_secs(60), || async {
                Ok::<_, String>(vec![1u32, 2, 3])
            })
            .await
            .unwrap();
        assert!(!first.from_cache());

        let second = cache
            .get_or_compute("user:1", Duration::from_secs(60), || async {
                Ok::<_, String>(vec![9u32])
            })
            .await
            .unwrap();
        assert!(second.from_cache());
        assert_eq!(second.into_value(), vec![1, 2, 3]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_compute_error_is_not_cached() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = aside(Arc::clone(&store));

        let result = cache
            .get_or_compute("job:1", Duration::from_secs(60), || async {
                Err::<u32, _>("store down".to_string())
            })
            .await;
        assert_eq!(result.unwrap_err(), "store down");
        assert!(store.is_empty());
        assert_eq!(cache.stats().compute_failures, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_open() {
        let store = Arc::new(InMemoryCacheStore::new());
        store.set_available(false);
        let cache = aside(Arc::clone(&store));

        let result = cache
            .get_or_compute("user:1", Duration::from_secs(60), || async {
                Ok::<_, String>("fresh".to_string())
            })
            .await
            .unwrap();
        assert!(!result.from_cache());
        assert_eq!(result.value(), "fresh");

        let stats = cache.stats();
        assert_eq!(stats.unavailable, 2);
        assert_eq!(stats.write_failures, 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        store
            .set("user:1", "not a number", Duration::from_secs(60))
            .await
            .unwrap();
        let cache = aside(Arc::clone(&store));

        let result = cache
            .get_or_compute("user:1", Duration::from_secs(60), || async {
                Ok::<_, String>(7u64)
            })
            .await
            .unwrap();
        assert!(!result.from_cache());
        assert_eq!(cache.stats().decode_failures, 1);
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_compute_once() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = aside(Arc::clone(&store));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("conversation:search:x", Duration::from_secs(60), move || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok::<_, String>(42u32)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            let cached = handle.await.unwrap().unwrap();
            assert_eq!(*cached.value(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.inflight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_directly_without_write_back() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = CacheAside::new(Arc::clone(&store) as Arc<dyn CacheStore>, Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let lookup = || {
            let counter = Arc::clone(&calls);
            cache.get_or_compute("analytics:platform:7d", Duration::from_secs(60), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        // The shared computation hangs well past the timeout.
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok::<_, String>(1u32)
                    } else {
                        Ok(2u32)
                    }
                }
            })
        };

        let first = lookup().await.unwrap();
        assert_eq!(*first.value(), 2);
        assert!(!first.from_cache());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().timeouts, 1);
        // The hung computation stays registered instead of being replaced.
        assert_eq!(cache.inflight_count(), 1);

        let second = lookup().await.unwrap();
        assert_eq!(*second.value(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().coalesced, 1);
        assert_eq!(cache.stats().timeouts, 2);

        // Let the hung computation finish: its late result is dropped.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cache.inflight_count(), 0);
        assert_eq!(store.get("analytics:platform:7d").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_recomputes() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = aside(Arc::clone(&store));

        let ttl = Duration::from_secs(300);
        cache
            .get_or_compute("message:search:a", ttl, || async { Ok::<_, String>(1u8) })
            .await
            .unwrap();
        tokio::time::advance(ttl).await;

        let again = cache
            .get_or_compute("message:search:a", ttl, || async { Ok::<_, String>(2u8) })
            .await
            .unwrap();
        assert!(!again.from_cache());
        assert_eq!(*again.value(), 2);
    }
}
