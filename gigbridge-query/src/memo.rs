use gigbridge_core::{CacheError, StoreError};
use gigbridge_storage::{CacheAside, Cached};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `compute` through the cache under `key`. A key that could not be
/// built bypasses the cache entirely.
pub(crate) async fn memoize<T, F, Fut>(
    cache: &CacheAside,
    key: Result<String, CacheError>,
    ttl: Duration,
    compute: F,
) -> Result<Cached<T>, StoreError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    match key {
        Ok(key) => cache.get_or_compute(&key, ttl, compute).await,
        Err(e) => {
            warn!(error = %e, "Could not build cache key, computing directly");
            compute().await.map(Cached::computed)
        }
    }
}
