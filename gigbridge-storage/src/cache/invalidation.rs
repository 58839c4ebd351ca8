//! Mutation-driven cache eviction.
//!
//! A mutation on an entity evicts its direct key plus every list, search,
//! suggestion and analytics namespace whose results could include it.
//! Eviction must run only after the underlying write has committed;
//! otherwise a concurrent reader can repopulate the cache with the
//! pre-mutation state for a full TTL.

use gigbridge_core::{EntityKind, SuggestionKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::keys::{KeyNamespace, ReportKind};
use super::traits::CacheStore;

/// Kind of write that triggered an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    Created,
    Updated,
    Deleted,
}

/// `(entity kind, entity id, operation)`, built inside the mutating call and
/// consumed immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub kind: EntityKind,
    pub id: Uuid,
    pub operation: MutationOp,
}

impl InvalidationEvent {
    pub fn new(kind: EntityKind, id: impl Into<Uuid>, operation: MutationOp) -> Self {
        Self {
            kind,
            id: id.into(),
            operation,
        }
    }
}

/// Keys and prefixes an event evicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub keys: Vec<String>,
    pub prefixes: Vec<String>,
}

/// Outcome of one invalidation. Failures are reported here, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub keys_deleted: u64,
    pub prefixes_cleared: u64,
    pub failures: Vec<String>,
}

impl InvalidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evicts cache entries made stale by a mutation.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    store: Arc<dyn CacheStore>,
}

impl InvalidationCoordinator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// What `event` evicts, without touching the store.
    pub fn plan(event: &InvalidationEvent) -> EvictionPlan {
        let keys = vec![KeyNamespace::entity(event.kind, event.id)];
        let prefixes = match event.kind {
            EntityKind::User => vec![
                KeyNamespace::list_prefix(EntityKind::User),
                KeyNamespace::search_prefix(EntityKind::User),
                KeyNamespace::suggestion_prefix(SuggestionKind::Users),
            ],
            // Job participation scopes message search, so a reassignment
            // must drop scoped message results too.
            EntityKind::Job => vec![
                KeyNamespace::list_prefix(EntityKind::Job),
                KeyNamespace::search_prefix(EntityKind::Message),
                KeyNamespace::search_prefix(EntityKind::Conversation),
                KeyNamespace::suggestion_prefix(SuggestionKind::Jobs),
                KeyNamespace::analytics_prefix(ReportKind::Platform),
            ],
            EntityKind::Message => vec![
                KeyNamespace::search_prefix(EntityKind::Message),
                KeyNamespace::search_prefix(EntityKind::Conversation),
                KeyNamespace::suggestion_prefix(SuggestionKind::Messages),
            ],
            EntityKind::Notification => {
                vec![KeyNamespace::analytics_prefix(ReportKind::Notifications)]
            }
            EntityKind::Conversation | EntityKind::Analytics | EntityKind::Suggestion => Vec::new(),
        };
        EvictionPlan { keys, prefixes }
    }

    /// Union of the plans for `events`, with duplicates removed.
    pub fn plan_all(events: &[InvalidationEvent]) -> EvictionPlan {
        let mut merged = EvictionPlan::default();
        for event in events {
            let plan = Self::plan(event);
            for key in plan.keys {
                if !merged.keys.contains(&key) {
                    merged.keys.push(key);
                }
            }
            for prefix in plan.prefixes {
                if !merged.prefixes.contains(&prefix) {
                    merged.prefixes.push(prefix);
                }
            }
        }
        merged
    }

    /// Evict everything `event` makes stale. Call after the write commits.
    pub async fn invalidate(&self, event: InvalidationEvent) -> InvalidationReport {
        let report = self.execute(Self::plan(&event)).await;
        debug!(
            kind = %event.kind,
            id = %event.id,
            operation = ?event.operation,
            keys_deleted = report.keys_deleted,
            failures = report.failures.len(),
            "Cache invalidated"
        );
        report
    }

    /// Evict for a batch of mutations, scanning each shared prefix once.
    pub async fn invalidate_all(&self, events: &[InvalidationEvent]) -> InvalidationReport {
        if events.is_empty() {
            return InvalidationReport::default();
        }
        let report = self.execute(Self::plan_all(events)).await;
        debug!(
            events = events.len(),
            keys_deleted = report.keys_deleted,
            failures = report.failures.len(),
            "Cache invalidated for batch"
        );
        report
    }

    async fn execute(&self, plan: EvictionPlan) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for key in &plan.keys {
            match self.store.delete(key).await {
                Ok(true) => report.keys_deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to invalidate cache key");
                    report.failures.push(format!("{key}: {e}"));
                }
            }
        }

        for prefix in &plan.prefixes {
            match self.store.delete_prefix(prefix).await {
                Ok(deleted) => {
                    report.keys_deleted += deleted;
                    report.prefixes_cleared += 1;
                }
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "Failed to invalidate cache prefix");
                    report.failures.push(format!("{prefix}: {e}"));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use std::time::Duration;

    #[test]
    fn test_job_plan() {
        let id = Uuid::nil();
        let plan = InvalidationCoordinator::plan(&InvalidationEvent::new(
            EntityKind::Job,
            id,
            MutationOp::Updated,
        ));
        assert_eq!(plan.keys, vec![format!("job:{id}")]);
        assert_eq!(
            plan.prefixes,
            vec![
                "job:list:".to_string(),
                "message:search:".to_string(),
                "conversation:search:".to_string(),
                "suggestion:jobs:".to_string(),
                "analytics:platform:".to_string(),
            ]
        );
    }

    #[test]
    fn test_message_and_notification_plans() {
        let message = InvalidationCoordinator::plan(&InvalidationEvent::new(
            EntityKind::Message,
            Uuid::nil(),
            MutationOp::Created,
        ));
        assert!(message.prefixes.contains(&"message:search:".to_string()));
        assert!(message.prefixes.contains(&"conversation:search:".to_string()));
        assert!(message.prefixes.contains(&"suggestion:messages:".to_string()));

        let notification = InvalidationCoordinator::plan(&InvalidationEvent::new(
            EntityKind::Notification,
            Uuid::nil(),
            MutationOp::Created,
        ));
        assert_eq!(notification.prefixes, vec!["analytics:notifications:".to_string()]);
    }

    #[tokio::test]
    async fn test_user_mutation_evicts_dependents_only() {
        let store = Arc::new(InMemoryCacheStore::new());
        let ttl = Duration::from_secs(600);
        let id = Uuid::now_v7();
        let other = Uuid::now_v7();

        store.set(&format!("user:{id}"), "u", ttl).await.unwrap();
        store.set(&format!("user:{other}"), "o", ttl).await.unwrap();
        store.set("user:search:{\"role\":\"client\"}", "s", ttl).await.unwrap();
        store.set("suggestion:users:v:al", "g", ttl).await.unwrap();
        store.set("suggestion:jobs:v:pl", "j", ttl).await.unwrap();

        let coordinator = InvalidationCoordinator::new(Arc::clone(&store) as Arc<dyn CacheStore>);
        let report = coordinator
            .invalidate(InvalidationEvent::new(EntityKind::User, id, MutationOp::Updated))
            .await;

        assert!(report.is_clean());
        assert_eq!(report.keys_deleted, 3);
        assert_eq!(report.prefixes_cleared, 3);
        assert_eq!(
            store.keys(),
            vec![format!("suggestion:jobs:v:pl"), format!("user:{other}")]
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_failures() {
        let store = Arc::new(InMemoryCacheStore::new());
        store.set_available(false);
        let coordinator = InvalidationCoordinator::new(Arc::clone(&store) as Arc<dyn CacheStore>);

        let report = coordinator
            .invalidate(InvalidationEvent::new(
                EntityKind::Message,
                Uuid::nil(),
                MutationOp::Created,
            ))
            .await;
        assert_eq!(report.failures.len(), 4);
        assert_eq!(report.keys_deleted, 0);
    }

    #[tokio::test]
    async fn test_batch_scans_shared_prefixes_once() {
        let store = Arc::new(InMemoryCacheStore::new());
        let ttl = Duration::from_secs(600);
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();
        store.set(&format!("message:{first}"), "a", ttl).await.unwrap();
        store.set(&format!("message:{second}"), "b", ttl).await.unwrap();
        store.set("conversation:search:v:{}", "c", ttl).await.unwrap();

        let events = [
            InvalidationEvent::new(EntityKind::Message, first, MutationOp::Updated),
            InvalidationEvent::new(EntityKind::Message, second, MutationOp::Updated),
        ];
        let plan = InvalidationCoordinator::plan_all(&events);
        assert_eq!(plan.keys.len(), 2);
        assert_eq!(plan.prefixes.len(), 3);

        let coordinator = InvalidationCoordinator::new(Arc::clone(&store) as Arc<dyn CacheStore>);
        let report = coordinator.invalidate_all(&events).await;
        assert_eq!(report.keys_deleted, 3);
        assert_eq!(report.prefixes_cleared, 3);
        assert!(store.is_empty());
    }
}
