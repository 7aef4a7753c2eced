/// TTL cache with per-category expiry and stampede collapse
///
/// Thread-safe response cache keyed by request identity. Concurrent misses
/// for the same key are collapsed into a single upstream fetch through a
/// per-key async gate; waiters re-check the cache once the gate opens and
/// hit the freshly written entry. A failed fetch is likewise shared: every
/// waiter queued on the same flight receives the first failure instead of
/// re-issuing the fetch. A failed refresh never evicts what is already
/// cached.
///
/// Optionally writes through to a durable `CacheStore` under namespaced
/// keys, with quota-pressure eviction handled in `storage`.
pub mod config;
pub mod storage;

pub use config::CacheTtlConfig;
pub use storage::{CacheStore, JsonFileStore, MemoryStore, StoreError, StoredEntry};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::debug;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::{ApiError, ApiResult};

/// One cached response. Created on a successful fetch, replaced on refresh,
/// never mutated in place.
struct CacheEntry {
    data: Value,
    stored_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Hit/miss accounting for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub inserts: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Per-call fetch options.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Skip any live entry and refetch. The result still lands in the cache.
    pub force_fresh: bool,
}

/// One collapsed in-flight fetch. The gate serializes waiters; the failure
/// slot carries the flight's first error to every waiter queued behind it.
struct Flight {
    gate: AsyncMutex<()>,
    failure: Mutex<Option<ApiError>>,
}

impl Flight {
    fn new() -> Self {
        Self {
            gate: AsyncMutex::new(()),
            failure: Mutex::new(None),
        }
    }
}

pub struct TtlCache {
    namespace: String,
    ttls: CacheTtlConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Per-key flights collapsing concurrent fetches for one key.
    inflight: AsyncMutex<HashMap<String, Arc<Flight>>>,
    metrics: RwLock<CacheMetrics>,
    store: Option<Arc<dyn CacheStore>>,
}

impl TtlCache {
    pub fn new(namespace: &str, ttls: CacheTtlConfig) -> Self {
        Self {
            namespace: namespace.to_string(),
            ttls,
            entries: RwLock::new(HashMap::new()),
            inflight: AsyncMutex::new(HashMap::new()),
            metrics: RwLock::new(CacheMetrics::default()),
            store: None,
        }
    }

    /// Attach a durable backend; entries are written through under
    /// `"<namespace>:<key>"` and hydrated on memory misses.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Return the live entry for `key`, invoking `fetcher` on a miss and
    /// caching its result under the category's TTL. Errors propagate and
    /// leave any existing entry untouched.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        category: &str,
        opts: FetchOptions,
        fetcher: F,
    ) -> ApiResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ApiResult<Value>>,
    {
        if !opts.force_fresh {
            if let Some(value) = self.read_live(key) {
                return Ok(value);
            }
        }

        let flight = self.flight_for(key).await;
        let result = {
            let _guard = flight.gate.lock().await;

            // Another caller may have completed the fetch while this one
            // waited on the gate.
            let raced = if opts.force_fresh {
                None
            } else {
                match self.read_live(key) {
                    Some(value) => Some(value),
                    None => self.hydrate_from_store(key, category).await,
                }
            };

            // A waiter that queued behind a failed fetch gets that failure
            // rather than re-issuing its own. Forced refreshes always fetch.
            let shared_failure = if opts.force_fresh {
                None
            } else {
                flight.failure.lock().clone()
            };

            match (raced, shared_failure) {
                (Some(value), _) => Ok(value),
                (None, Some(err)) => Err(err),
                (None, None) => match fetcher().await {
                    Ok(value) => {
                        self.insert(key, category, value.clone()).await;
                        Ok(value)
                    }
                    Err(e) => {
                        *flight.failure.lock() = Some(e.clone());
                        Err(e)
                    }
                },
            }
        };
        drop(flight);
        self.release_flight(key).await;
        result
    }

    /// Remove one entry, or everything when `key` is `None`.
    pub async fn clear(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.write().remove(key);
                if let Some(store) = &self.store {
                    store.remove(&self.namespaced(key)).await;
                }
            }
            None => {
                self.entries.write().clear();
                if let Some(store) = &self.store {
                    store.clear().await;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.read().clone()
    }

    // -- internals -----------------------------------------------------------

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Live-entry read; expired entries are removed on the miss path.
    fn read_live(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.metrics.write().hits += 1;
                Some(entry.data.clone())
            }
            Some(_) => {
                entries.remove(key);
                let mut metrics = self.metrics.write();
                metrics.misses += 1;
                metrics.expirations += 1;
                None
            }
            None => {
                self.metrics.write().misses += 1;
                None
            }
        }
    }

    /// Pull a live entry out of the durable store into memory, if present.
    async fn hydrate_from_store(&self, key: &str, category: &str) -> Option<Value> {
        let store = self.store.as_ref()?;
        let stored = store.read(&self.namespaced(key)).await?;
        if !stored.is_live(Utc::now()) {
            store.remove(&self.namespaced(key)).await;
            return None;
        }
        debug!("cache: hydrated '{}' from durable store", key);
        let ttl = self.ttls.ttl_for(category);
        let remaining = (stored.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(ttl);
        let now = Instant::now();
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                data: stored.data.clone(),
                stored_at: now,
                expires_at: now + remaining,
            },
        );
        Some(stored.data)
    }

    async fn insert(&self, key: &str, category: &str, value: Value) {
        let ttl = self.ttls.ttl_for(category);
        let now = Instant::now();
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                data: value.clone(),
                stored_at: now,
                expires_at: now + ttl,
            },
        );
        self.metrics.write().inserts += 1;

        if let Some(store) = &self.store {
            let stored_at = Utc::now();
            let entry = StoredEntry {
                data: value,
                stored_at,
                expires_at: stored_at
                    + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            };
            storage::write_with_eviction(store.as_ref(), &self.namespaced(key), entry).await;
        }
    }

    async fn flight_for(&self, key: &str) -> Arc<Flight> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Flight::new()))
            .clone()
    }

    /// Drop the flight, and its failure slot, once the last waiter is
    /// through. Later callers start a fresh flight and fetch again.
    async fn release_flight(&self, key: &str) {
        let mut inflight = self.inflight.lock().await;
        if let Some(flight) = inflight.get(key) {
            if Arc::strong_count(flight) == 1 {
                inflight.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn short_ttl_cache() -> TtlCache {
        let ttls = CacheTtlConfig::new(Duration::from_millis(40))
            .with_category("slow", Duration::from_secs(60));
        TtlCache::new("test", ttls)
    }

    fn fail(endpoint: &str) -> ApiError {
        ApiError::Network {
            endpoint: endpoint.into(),
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_skips_fetcher() {
        let cache = short_ttl_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_fetch("k", "slow", FetchOptions::default(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"v": 1}))
                })
                .await
                .unwrap();
            assert_eq!(value, json!({"v": 1}));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let cache = short_ttl_cache();
        let calls = AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(1))
        };
        cache
            .get_or_fetch("k", "default", FetchOptions::default(), fetch)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        cache
            .get_or_fetch("k", "default", FetchOptions::default(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(2))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.metrics().expirations, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_to_one_fetch() {
        let cache = Arc::new(short_ttl_cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("same-key", "slow", FetchOptions::default(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(json!({"shared": true}))
                    })
                    .await
                    .unwrap()
            }));
        }

        let results = futures::future::join_all(tasks).await;
        for result in results {
            assert_eq!(result.unwrap(), json!({"shared": true}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "stampede must collapse");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_failure() {
        let cache = Arc::new(short_ttl_cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("same-key", "slow", FetchOptions::default(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(fail("/v1/news"))
                    })
                    .await
            }));
        }

        let results = futures::future::join_all(tasks).await;
        for result in results {
            assert!(matches!(result.unwrap(), Err(ApiError::Network { .. })));
        }
        // The first waiter's failure is handed to all the others.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        // A caller arriving after the flight drained starts a new fetch.
        let value = cache
            .get_or_fetch("same-key", "slow", FetchOptions::default(), || async {
                Ok(json!("recovered"))
            })
            .await
            .unwrap();
        assert_eq!(value, json!("recovered"));
    }

    #[tokio::test]
    async fn test_failed_fetch_propagates_and_keeps_nothing() {
        let cache = short_ttl_cache();
        let result = cache
            .get_or_fetch("k", "slow", FetchOptions::default(), || async {
                Err(fail("/v1/news"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_existing_entry() {
        let cache = short_ttl_cache();
        cache
            .get_or_fetch("k", "slow", FetchOptions::default(), || async {
                Ok(json!("original"))
            })
            .await
            .unwrap();

        // Forced refresh fails; the live entry must survive.
        let refresh = cache
            .get_or_fetch("k", "slow", FetchOptions { force_fresh: true }, || async {
                Err(fail("/v1/news"))
            })
            .await;
        assert!(refresh.is_err());

        let value = cache
            .get_or_fetch("k", "slow", FetchOptions::default(), || async {
                panic!("must be served from cache")
            })
            .await
            .unwrap();
        assert_eq!(value, json!("original"));
    }

    #[tokio::test]
    async fn test_force_fresh_bypasses_live_entry() {
        let cache = short_ttl_cache();
        let calls = AtomicUsize::new(0);

        for expected in ["a", "b"] {
            let value = cache
                .get_or_fetch("k", "slow", FetchOptions { force_fresh: true }, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(expected))
                })
                .await
                .unwrap();
            assert_eq!(value, json!(expected));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_single_key_and_all() {
        let cache = short_ttl_cache();
        for key in ["a", "b"] {
            cache
                .get_or_fetch(key, "slow", FetchOptions::default(), || async { Ok(json!(1)) })
                .await
                .unwrap();
        }
        cache.clear(Some("a")).await;
        assert_eq!(cache.len(), 1);
        cache.clear(None).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_write_through_and_hydrate_from_store() {
        let store = Arc::new(MemoryStore::new());
        let ttls = CacheTtlConfig::new(Duration::from_secs(60));
        let cache = TtlCache::new("ns", ttls.clone()).with_store(Arc::clone(&store) as _);

        cache
            .get_or_fetch("k", "default", FetchOptions::default(), || async {
                Ok(json!("persisted"))
            })
            .await
            .unwrap();
        assert!(store.read("ns:k").await.is_some(), "write-through expected");

        // A fresh cache over the same store serves the key without fetching.
        let rehydrated = TtlCache::new("ns", ttls).with_store(store as _);
        let value = rehydrated
            .get_or_fetch("k", "default", FetchOptions::default(), || async {
                panic!("must hydrate from store")
            })
            .await
            .unwrap();
        assert_eq!(value, json!("persisted"));
    }
}
