//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use gigbridge_core::SystemClock;
use gigbridge_query::QueryLayer;
use gigbridge_storage::{
    CacheAside, CacheStore, FixedWindowRateLimiter, MarketplaceStore, TtlProfile,
};

use crate::config::ApiConfig;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Search, analytics and cached entity access.
    pub query: QueryLayer,
    /// Uncached store, for readiness checks.
    pub store: Arc<dyn MarketplaceStore>,
    /// The process-wide cache store every component shares.
    pub cache_store: Arc<dyn CacheStore>,
    pub rate_limiter: Arc<FixedWindowRateLimiter>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the query layer and rate limiter over one store and one cache.
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        cache_store: Arc<dyn CacheStore>,
        cache: CacheAside,
        ttl: TtlProfile,
        config: ApiConfig,
    ) -> Self {
        let query = QueryLayer::new(Arc::clone(&store), cache, Arc::new(SystemClock), ttl);
        Self::from_parts(query, store, cache_store, config)
    }

    /// Build around an already wired query layer (tests inject a fixed clock
    /// this way).
    pub fn from_parts(
        query: QueryLayer,
        store: Arc<dyn MarketplaceStore>,
        cache_store: Arc<dyn CacheStore>,
        config: ApiConfig,
    ) -> Self {
        let rate_limiter = Arc::new(FixedWindowRateLimiter::new(
            Arc::clone(&cache_store),
            config.rate_limit_requests,
            config.rate_limit_window,
        ));
        Self {
            query,
            store,
            cache_store,
            rate_limiter,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

state_fields! {
    query: QueryLayer,
    rate_limiter: Arc<FixedWindowRateLimiter>,
    config: Arc<ApiConfig>,
}
