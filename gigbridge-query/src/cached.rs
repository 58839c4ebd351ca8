//! Cache-aside entity access with write-then-invalidate mutations.
//!
//! Reads go through [`CacheAside`]. Every mutation writes to the store
//! first and only evicts once the write has returned, so a concurrent
//! reader cannot repopulate the cache with the pre-mutation state. Cache
//! failures during eviction are reported, never raised; the write has
//! already succeeded by then.

use gigbridge_core::{
    EntityKind, GigResult, Job, JobId, JobSortField, Message, Notification, Pagination,
    SearchResult, SortDirection, User, UserId,
};
use gigbridge_storage::{
    fold_text, CacheAside, Cached, InvalidationCoordinator, InvalidationEvent, InvalidationReport,
    JobQuery, JobSort, KeyNamespace, MarketplaceStore, MutationOp, StoreResult, TtlProfile,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Job list filter and sort as they appear in the cache key.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobListKey<'a> {
    filters: &'a JobQuery,
    sort_by: JobSortField,
    sort_order: SortDirection,
}

#[derive(Clone)]
pub struct CachedMarketplace {
    store: Arc<dyn MarketplaceStore>,
    cache: CacheAside,
    invalidation: InvalidationCoordinator,
    ttl: TtlProfile,
}

impl CachedMarketplace {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        cache: CacheAside,
        invalidation: InvalidationCoordinator,
        ttl: TtlProfile,
    ) -> Self {
        Self {
            store,
            cache,
            invalidation,
            ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn MarketplaceStore> {
        &self.store
    }

    /// A user by id. Absence is cached too, for the same TTL.
    pub async fn user(&self, id: UserId) -> GigResult<Cached<Option<User>>> {
        let store = Arc::clone(&self.store);
        let result = self
            .cache
            .get_or_compute(&KeyNamespace::user(id), self.ttl.user, move || {
                let store = Arc::clone(&store);
                async move { store.user_get(id).await }
            })
            .await?;
        Ok(result)
    }

    pub async fn job(&self, id: JobId) -> GigResult<Cached<Option<Job>>> {
        let store = Arc::clone(&self.store);
        let result = self
            .cache
            .get_or_compute(&KeyNamespace::job(id), self.ttl.job, move || {
                let store = Arc::clone(&store);
                async move { store.job_get(id).await }
            })
            .await?;
        Ok(result)
    }

    /// One page of jobs matching `query`.
    pub async fn jobs(
        &self,
        query: JobQuery,
        sort: JobSort,
        page: Pagination,
    ) -> GigResult<Cached<SearchResult<Job>>> {
        let keyed = JobQuery {
            text: fold_text(&query.text),
            ..query.clone()
        };
        let key = KeyNamespace::job_list(
            &JobListKey {
                filters: &keyed,
                sort_by: sort.field,
                sort_order: sort.direction,
            },
            &page,
        );
        let store = Arc::clone(&self.store);
        let result = crate::memo::memoize(&self.cache, key, self.ttl.job_list, move || {
            list_jobs(Arc::clone(&store), query.clone(), sort, page)
        })
        .await?;
        Ok(result)
    }

    pub async fn save_user(&self, user: &User, op: MutationOp) -> GigResult<InvalidationReport> {
        self.store.user_upsert(user).await?;
        Ok(self
            .evict(InvalidationEvent::new(EntityKind::User, user.user_id, op))
            .await)
    }

    pub async fn save_job(&self, job: &Job, op: MutationOp) -> GigResult<InvalidationReport> {
        self.store.job_upsert(job).await?;
        Ok(self
            .evict(InvalidationEvent::new(EntityKind::Job, job.job_id, op))
            .await)
    }

    pub async fn post_message(&self, message: &Message) -> GigResult<InvalidationReport> {
        self.store.message_insert(message).await?;
        Ok(self
            .evict(InvalidationEvent::new(
                EntityKind::Message,
                message.message_id,
                MutationOp::Created,
            ))
            .await)
    }

    /// Mark `reader`'s messages in `job` as read and evict every search the
    /// unread counts feed.
    pub async fn mark_read(&self, job: JobId, reader: UserId) -> GigResult<InvalidationReport> {
        let changed = self.store.messages_mark_read(job, reader).await?;
        let events: Vec<InvalidationEvent> = changed
            .into_iter()
            .map(|id| InvalidationEvent::new(EntityKind::Message, id, MutationOp::Updated))
            .collect();
        info!(job_id = %job, reader = %reader, marked = events.len(), "Messages marked read");
        Ok(self.invalidation.invalidate_all(&events).await)
    }

    pub async fn notify(&self, notification: &Notification) -> GigResult<InvalidationReport> {
        self.store.notification_insert(notification).await?;
        Ok(self
            .evict(InvalidationEvent::new(
                EntityKind::Notification,
                notification.notification_id,
                MutationOp::Created,
            ))
            .await)
    }

    async fn evict(&self, event: InvalidationEvent) -> InvalidationReport {
        let report = self.invalidation.invalidate(event).await;
        if !report.is_clean() {
            warn!(
                kind = %event.kind,
                id = %event.id,
                failures = report.failures.len(),
                "Write committed but cache eviction was incomplete"
            );
        }
        report
    }
}

async fn list_jobs(
    store: Arc<dyn MarketplaceStore>,
    query: JobQuery,
    sort: JobSort,
    page: Pagination,
) -> StoreResult<SearchResult<Job>> {
    let (total, items) = tokio::try_join!(
        store.job_count(&query),
        store.job_find(&query, sort, page),
    )?;
    Ok(SearchResult::new(items, page.meta(total)))
}
