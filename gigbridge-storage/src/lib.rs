//! GigBridge Storage
//!
//! The cache layer (store contract, Redis and in-memory backends, key
//! namespace, cache-aside with single-flight, invalidation, rate limiting)
//! and the persistent [`MarketplaceStore`] contract the query layer reads
//! through.

pub mod cache;
pub mod store;

pub use cache::{
    canonical_json, fold_text, open_store, ttl_secs, CacheAside, CacheBackendKind, CacheCodec,
    CacheResult, CacheSettings, CacheStats, CacheStore, Cached, EvictionPlan,
    FixedWindowRateLimiter, InMemoryCacheStore, InvalidationCoordinator, InvalidationEvent,
    InvalidationReport, KeyNamespace, MutationOp, RateDecision, ReconnectPolicy, RedisCacheStore,
    ReportKind, TtlProfile,
};
pub use store::{
    sort_buckets, Aggregation, Bucket, ConversationRollup, ConversationScope,
    InMemoryMarketplaceStore, JobQuery, JobSort, MarketplaceStore, MessageFacet, MessageQuery,
    MessageSort, NotificationFacet, Sort, StoreResult, UserFacet, UserQuery, UserSort, READ, UNREAD,
    UNVERIFIED, VERIFIED,
};
