//! Cache layer: store contract, cache-aside policy and invalidation.
//!
//! The cache is a pure optimization. Every component here treats an
//! unavailable store as a reason to degrade, never as a request failure.
//!
//! # Example
//!
//! ```ignore
//! let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
//! let cache = CacheAside::new(Arc::clone(&store), Duration::from_secs(10));
//!
//! let user = cache
//!     .get_or_compute(&KeyNamespace::user(id), ttl.user, move || load_user(id))
//!     .await?;
//! if user.from_cache() { /* ... */ }
//!
//! // After the write commits:
//! coordinator
//!     .invalidate(InvalidationEvent::new(EntityKind::User, id, MutationOp::Updated))
//!     .await;
//! ```

pub mod aside;
pub mod codec;
pub mod config;
pub mod invalidation;
pub mod keys;
pub mod memory;
pub mod rate_limit;
pub mod redis_backend;
pub mod traits;

pub use aside::{CacheAside, Cached};
pub use codec::CacheCodec;
pub use config::{CacheBackendKind, CacheSettings, TtlProfile};
pub use invalidation::{
    EvictionPlan, InvalidationCoordinator, InvalidationEvent, InvalidationReport, MutationOp,
};
pub use keys::{canonical_json, fold_text, KeyNamespace, ReportKind};
pub use memory::InMemoryCacheStore;
pub use rate_limit::{FixedWindowRateLimiter, RateDecision};
pub use redis_backend::{RedisCacheStore, ReconnectPolicy};
pub use traits::{ttl_secs, CacheResult, CacheStats, CacheStore};

use std::sync::Arc;

/// Open the store named by `settings`. Redis connects lazily, so this never
/// blocks on the network.
pub fn open_store(settings: &CacheSettings) -> CacheResult<Arc<dyn CacheStore>> {
    match &settings.backend {
        CacheBackendKind::Redis { url } => {
            Ok(Arc::new(RedisCacheStore::new(url, settings.reconnect)?))
        }
        CacheBackendKind::Memory => Ok(Arc::new(InMemoryCacheStore::new())),
    }
}
