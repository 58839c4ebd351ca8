//! Cache store contract and usage statistics.
//!
//! A [`CacheStore`] is a thin, text-valued key/value contract over a
//! networked store. Every operation is fallible and a connection problem is
//! reported as [`CacheError::StoreUnavailable`], which callers can tell apart
//! from a plain miss (`Ok(None)`).

use async_trait::async_trait;
use gigbridge_core::CacheError;
use std::time::Duration;

/// Result alias for cache store operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value store used as the cache.
///
/// Implementations must be safe to share across tasks; one instance is
/// opened at startup and handed to every component that needs it.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name used in logs and error messages.
    fn backend_name(&self) -> &'static str;

    /// Read a value. Expired entries are never returned.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a value that expires after `ttl` (rounded up to whole seconds,
    /// minimum one second).
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every key starting with `prefix`. The prefix is matched
    /// literally; glob characters in it have no special meaning.
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Atomically add `amount` to an integer value, creating it at zero
    /// first when absent. An existing expiry is preserved.
    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64>;

    /// Like [`increment`](Self::increment), but a key created by this call
    /// gets `ttl` in the same atomic step, so a counter can never outlive
    /// its window.
    async fn increment_within(&self, key: &str, amount: i64, ttl: Duration) -> CacheResult<i64>;

    /// Set the expiry of an existing key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Round trip to the backend, for readiness checks.
    async fn ping(&self) -> CacheResult<()>;
}

/// TTL in whole seconds as sent to the backend. Never zero.
pub fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Statistics about cache-aside usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that had to compute.
    pub misses: u64,
    /// Misses that joined a computation already in flight.
    pub coalesced: u64,
    /// Calls where the store reported itself unavailable.
    pub unavailable: u64,
    /// Write-backs that failed after a successful computation.
    pub write_failures: u64,
    /// Cached payloads that no longer decoded into the expected type.
    pub decode_failures: u64,
    /// Computations that returned an error.
    pub compute_failures: u64,
    /// Waits that exceeded the compute timeout.
    pub timeouts: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
