//! In-process cache store.
//!
//! Used by tests and single-node deployments. Expiry is tracked with
//! `tokio::time::Instant`, so paused test time drives it deterministically.

use async_trait::async_trait;
use dashmap::DashMap;
use gigbridge_core::CacheError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::traits::{ttl_secs, CacheResult, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Cache store backed by a concurrent map.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, Entry>,
    available: AtomicBool,
    operations: AtomicU64,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            operations: AtomicU64::new(0),
        }
    }

    /// Toggle simulated availability. While unavailable every call fails
    /// with `StoreUnavailable` and stored data is left untouched.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of calls made against this store, including failed ones.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted. Handy for assertions.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    fn check(&self) -> CacheResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::StoreUnavailable {
                backend: self.backend_name().to_string(),
                reason: "store marked unavailable".to_string(),
            })
        }
    }

    /// Drop `key` if it has expired. Returns the live entry otherwise.
    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_live(now) {
            Some(entry)
        } else {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
            None
        }
    }

    /// Add to an integer entry under the shard lock. A missing or expired
    /// entry restarts at zero, expiring after `ttl_if_new` when given.
    fn add(&self, key: &str, amount: i64, ttl_if_new: Option<Duration>) -> CacheResult<i64> {
        self.check()?;
        let now = Instant::now();
        let fresh = || Entry {
            value: "0".to_string(),
            expires_at: ttl_if_new.map(|ttl| now + Duration::from_secs(ttl_secs(ttl))),
        };
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(fresh);
        if !entry.is_live(now) {
            *entry = fresh();
        }

        let current: i64 = entry.value.parse().map_err(|_| CacheError::Command {
            command: "INCRBY".to_string(),
            reason: "value is not an integer".to_string(),
        })?;
        let next = current.checked_add(amount).ok_or_else(|| CacheError::Command {
            command: "INCRBY".to_string(),
            reason: "increment would overflow".to_string(),
        })?;
        entry.value = next.to_string();
        Ok(next)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        Ok(self.live(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs(ttl));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        self.check()?;
        let now = Instant::now();
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();

        let mut deleted = 0;
        for key in matching {
            if let Some((_, entry)) = self.entries.remove(&key) {
                if entry.is_live(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        Ok(self.live(key).is_some())
    }

    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.add(key, amount, None)
    }

    async fn increment_within(&self, key: &str, amount: i64, ttl: Duration) -> CacheResult<i64> {
        self.add(key, amount, Some(ttl))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check()?;
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs(ttl)));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_get_roundtrip_and_expiry() {
        let store = InMemoryCacheStore::new();
        store.set("user:1", "alice", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("alice"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.exists("user:1").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("user:1").await.unwrap(), None);
        assert!(!store.exists("user:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_then_get_misses() {
        let store = InMemoryCacheStore::new();
        assert!(!store.delete("job:1").await.unwrap());
        store.set("job:1", "x", Duration::from_secs(5)).await.unwrap();
        assert!(store.delete("job:1").await.unwrap());
        assert_eq!(store.get("job:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_prefix_is_literal() {
        let store = InMemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set("job:list:{}:1:20", "a", ttl).await.unwrap();
        store.set("job:list:{}:2:20", "b", ttl).await.unwrap();
        store.set("job:123", "c", ttl).await.unwrap();
        store.set("job:*", "literal", ttl).await.unwrap();

        assert_eq!(store.delete_prefix("job:list:").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["job:*".to_string(), "job:123".to_string()]);

        assert_eq!(store.delete_prefix("job:*").await.unwrap(), 1);
        assert_eq!(store.keys(), vec!["job:123".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_and_expire() {
        let store = InMemoryCacheStore::new();
        assert_eq!(store.increment("ratelimit:a:1", 1).await.unwrap(), 1);
        assert_eq!(store.increment("ratelimit:a:1", 4).await.unwrap(), 5);
        assert!(store.expire("ratelimit:a:1", Duration::from_secs(10)).await.unwrap());
        assert!(!store.expire("missing", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.increment("ratelimit:a:1", 1).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_within_sets_expiry_on_create_only() {
        let store = InMemoryCacheStore::new();
        let ttl = Duration::from_secs(10);
        assert_eq!(store.increment_within("ratelimit:b:1", 1, ttl).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        // A later hit does not push the expiry out.
        assert_eq!(store.increment_within("ratelimit:b:1", 1, ttl).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!store.exists("ratelimit:b:1").await.unwrap());
        assert_eq!(store.increment_within("ratelimit:b:1", 1, ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = InMemoryCacheStore::new();
        store.set("user:1", "alice", Duration::from_secs(5)).await.unwrap();
        let err = store.increment("user:1", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Command { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryCacheStore::new();
        store.set("k", "v", Duration::from_secs(5)).await.unwrap();
        store.set_available(false);

        assert!(store.get("k").await.unwrap_err().is_unavailable());
        assert!(store.set("k", "v", Duration::from_secs(5)).await.unwrap_err().is_unavailable());
        assert!(store.delete("k").await.unwrap_err().is_unavailable());
        assert!(store.ping().await.unwrap_err().is_unavailable());

        store.set_available(true);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
