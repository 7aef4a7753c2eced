/// Durable storage backends for the cache
///
/// The durable variant mirrors browser storage: string-keyed JSON entries
/// with a hard size quota. Writes are best-effort - a full store evicts the
/// oldest slice and retries once, then drops the write. A dropped write is
/// never surfaced to the caller; caching is not a correctness requirement.
use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire shape of one durable entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub data: serde_json::Value,
    #[serde(rename = "timestamp")]
    pub stored_at: DateTime<Utc>,
    #[serde(rename = "expiry")]
    pub expires_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected the write for lack of space.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage error: {0}")]
    Io(String),
}

/// Key-value backend holding serialized cache entries. Keys arrive already
/// namespaced (`"<namespace>:<key>"`).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, key: &str) -> Option<StoredEntry>;
    async fn write(&self, key: &str, entry: StoredEntry) -> Result<(), StoreError>;
    async fn remove(&self, key: &str);
    /// All keys with their `stored_at`, for age-ordered eviction.
    async fn keys(&self) -> Vec<(String, DateTime<Utc>)>;
    async fn clear(&self);
    async fn len(&self) -> usize;
}

/// Write an entry, applying the quota-eviction policy: on a quota rejection
/// drop the oldest 20% of entries (minimum one) by `stored_at` and retry
/// once. A second failure drops the write with a warning.
pub async fn write_with_eviction(store: &dyn CacheStore, key: &str, entry: StoredEntry) {
    match store.write(key, entry.clone()).await {
        Ok(()) => {}
        Err(StoreError::QuotaExceeded) => {
            let mut keys = store.keys().await;
            keys.sort_by_key(|(_, stored_at)| *stored_at);
            let evict_count = (keys.len() / 5).max(1);
            debug!(
                "cache store full, evicting {} oldest of {} entries",
                evict_count,
                keys.len()
            );
            for (old_key, _) in keys.into_iter().take(evict_count) {
                store.remove(&old_key).await;
            }
            if let Err(e) = store.write(key, entry).await {
                warn!("cache: dropping write for '{}' after eviction retry: {}", key, e);
            }
        }
        Err(e) => {
            warn!("cache: dropping write for '{}': {}", key, e);
        }
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Unbounded in-memory backend. Used when durability is not configured and
/// as the substrate for quota simulations in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &str) -> Option<StoredEntry> {
        self.entries.lock().get(key).cloned()
    }

    async fn write(&self, key: &str, entry: StoredEntry) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    async fn keys(&self) -> Vec<(String, DateTime<Utc>)> {
        self.entries
            .lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.stored_at))
            .collect()
    }

    async fn clear(&self) {
        self.entries.lock().clear();
    }

    async fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

// ============================================================================
// JSON FILE STORE
// ============================================================================

/// Size-bounded JSON-file backend, the crate's analog of quota-limited
/// browser storage. The whole map is serialized on every committed write;
/// a write that would push the serialized size past `max_bytes` is rejected
/// with `QuotaExceeded` without committing.
pub struct JsonFileStore {
    path: PathBuf,
    max_bytes: usize,
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf, max_bytes: usize) -> Self {
        let entries = Self::load(&path);
        Self {
            path,
            max_bytes,
            entries: Mutex::new(entries),
        }
    }

    fn load(path: &std::path::Path) -> HashMap<String, StoredEntry> {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!("cache store file corrupt, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("failed to read cache store, starting empty: {}", e);
                HashMap::new()
            }
        }
    }

    fn persist(&self, snapshot: &HashMap<String, StoredEntry>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string(snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("failed to persist cache store: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize cache store: {}", e),
        }
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn read(&self, key: &str) -> Option<StoredEntry> {
        self.entries.lock().get(key).cloned()
    }

    async fn write(&self, key: &str, entry: StoredEntry) -> Result<(), StoreError> {
        let snapshot = {
            let mut guard = self.entries.lock();
            let mut candidate = guard.clone();
            candidate.insert(key.to_string(), entry);
            let serialized = serde_json::to_string(&candidate)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            if serialized.len() > self.max_bytes {
                return Err(StoreError::QuotaExceeded);
            }
            *guard = candidate;
            guard.clone()
        };
        self.persist(&snapshot);
        Ok(())
    }

    async fn remove(&self, key: &str) {
        let snapshot = {
            let mut guard = self.entries.lock();
            guard.remove(key);
            guard.clone()
        };
        self.persist(&snapshot);
    }

    async fn keys(&self) -> Vec<(String, DateTime<Utc>)> {
        self.entries
            .lock()
            .iter()
            .map(|(k, e)| (k.clone(), e.stored_at))
            .collect()
    }

    async fn clear(&self) {
        self.entries.lock().clear();
        self.persist(&HashMap::new());
    }

    async fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(data: &str, age_secs: i64) -> StoredEntry {
        let now = Utc::now();
        StoredEntry {
            data: serde_json::json!(data),
            stored_at: now - ChronoDuration::seconds(age_secs),
            expires_at: now + ChronoDuration::seconds(600),
        }
    }

    /// Store that rejects a configurable number of writes with QuotaExceeded
    /// before delegating to an inner MemoryStore.
    struct QuotaOnceStore {
        inner: MemoryStore,
        failures_left: Mutex<u32>,
    }

    impl QuotaOnceStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures_left: Mutex::new(failures),
            }
        }
    }

    #[async_trait]
    impl CacheStore for QuotaOnceStore {
        async fn read(&self, key: &str) -> Option<StoredEntry> {
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, entry: StoredEntry) -> Result<(), StoreError> {
            {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::QuotaExceeded);
                }
            }
            self.inner.write(key, entry).await
        }

        async fn remove(&self, key: &str) {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> Vec<(String, DateTime<Utc>)> {
            self.inner.keys().await
        }

        async fn clear(&self) {
            self.inner.clear().await
        }

        async fn len(&self) -> usize {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_quota_evicts_oldest_fifth_and_retries() {
        let store = QuotaOnceStore::new(1);
        // Ten pre-existing entries, k0 oldest .. k9 newest.
        for i in 0..10 {
            store
                .inner
                .write(&format!("ns:k{}", i), entry("old", 100 - i))
                .await
                .unwrap();
        }

        write_with_eviction(&store, "ns:new", entry("new", 0)).await;

        // Oldest two (20% of 10) evicted, triggering write landed on retry.
        assert_eq!(store.len().await, 9);
        assert!(store.read("ns:k0").await.is_none());
        assert!(store.read("ns:k1").await.is_none());
        assert!(store.read("ns:k2").await.is_some());
        assert!(store.read("ns:new").await.is_some());
    }

    #[tokio::test]
    async fn test_second_quota_failure_drops_write_silently() {
        let store = QuotaOnceStore::new(2);
        for i in 0..10 {
            store
                .inner
                .write(&format!("ns:k{}", i), entry("old", 100 - i))
                .await
                .unwrap();
        }

        // Both the initial write and the retry fail; no panic, no error.
        write_with_eviction(&store, "ns:new", entry("new", 0)).await;

        assert!(store.read("ns:new").await.is_none());
        // Eviction still happened before the failed retry.
        assert_eq!(store.len().await, 8);
    }

    #[tokio::test]
    async fn test_eviction_floor_is_one_entry() {
        let store = QuotaOnceStore::new(1);
        store.inner.write("ns:k0", entry("old", 50)).await.unwrap();
        store.inner.write("ns:k1", entry("old", 10)).await.unwrap();

        write_with_eviction(&store, "ns:new", entry("new", 0)).await;

        // len/5 of 2 is 0, floored to 1: only the oldest goes.
        assert!(store.read("ns:k0").await.is_none());
        assert!(store.read("ns:k1").await.is_some());
        assert!(store.read("ns:new").await.is_some());
    }

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = JsonFileStore::new(path.clone(), 64 * 1024);
        store.write("ns:a", entry("hello", 0)).await.unwrap();

        // A fresh instance reloads the persisted entry.
        let reloaded = JsonFileStore::new(path, 64 * 1024);
        let got = reloaded.read("ns:a").await.expect("entry should persist");
        assert_eq!(got.data, serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn test_json_file_store_quota_rejects_without_committing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache.json"), 64);

        let big = StoredEntry {
            data: serde_json::json!("x".repeat(200)),
            stored_at: Utc::now(),
            expires_at: Utc::now() + ChronoDuration::seconds(60),
        };
        let result = store.write("ns:big", big).await;
        assert!(matches!(result, Err(StoreError::QuotaExceeded)));
        assert_eq!(store.len().await, 0);
    }
}
