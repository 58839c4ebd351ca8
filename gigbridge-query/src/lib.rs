//! GigBridge Query - Search, Analytics and Cached Entity Access
//!
//! Everything here reads through the cache-aside policy from
//! `gigbridge-storage` and falls back to the [`MarketplaceStore`] on a miss.
//!
//! [`MarketplaceStore`]: gigbridge_storage::MarketplaceStore

mod analytics;
mod cached;
mod memo;
mod search;

pub use analytics::{
    AnalyticsAggregator, CountEntry, FileEntry, FileReport, HourCount, MessageReport,
    NotificationReport, PlatformReport, ReportPeriod, UserReport, TOP_N,
};
pub use cached::CachedMarketplace;
pub use search::{require_admin, Conversation, SearchEngine};

use gigbridge_core::Clock;
use gigbridge_storage::{CacheAside, InvalidationCoordinator, MarketplaceStore, TtlProfile};
use std::sync::Arc;

/// The query layer wired over one store and one cache.
#[derive(Clone)]
pub struct QueryLayer {
    pub search: SearchEngine,
    pub analytics: AnalyticsAggregator,
    pub marketplace: CachedMarketplace,
    pub cache: CacheAside,
}

impl QueryLayer {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        cache: CacheAside,
        clock: Arc<dyn Clock>,
        ttl: TtlProfile,
    ) -> Self {
        let invalidation = InvalidationCoordinator::new(Arc::clone(cache.store()));
        Self {
            search: SearchEngine::new(Arc::clone(&store), cache.clone(), ttl),
            analytics: AnalyticsAggregator::new(
                Arc::clone(&store),
                cache.clone(),
                clock,
                ttl.analytics,
            ),
            marketplace: CachedMarketplace::new(store, cache.clone(), invalidation, ttl),
            cache,
        }
    }
}
