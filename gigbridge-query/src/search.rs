//! Faceted search over messages, conversations and users, plus
//! autocomplete suggestions.
//!
//! Every search is memoized through [`CacheAside`] under a key derived from
//! the viewer and the canonical filter. Authorization is part of the query:
//! message and conversation searches only ever see jobs the viewer takes
//! part in, and user search requires an admin principal.

use gigbridge_core::{
    contains_ignore_case, AuthorizationError, ConversationSearch, ConversationSortField,
    GigResult, JobId, JobStatus, Message, MessageSearch, Pagination, Principal, SearchResult,
    SortDirection, SuggestionKind, SuggestionRequest, User, UserId, UserSearch, MAX_LIMIT,
    MAX_SUGGESTIONS,
};
use gigbridge_storage::{
    CacheAside, Cached, ConversationScope, JobQuery, KeyNamespace, MarketplaceStore,
    MessageQuery, Sort, StoreResult, TtlProfile, UserQuery,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::memo::memoize;

/// Longest message excerpt offered as a suggestion.
const SUGGESTION_EXCERPT_CHARS: usize = 80;

/// One job conversation as seen by the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub job_id: JobId,
    pub job_title: String,
    pub job_status: JobStatus,
    pub last_message: Message,
    pub message_count: u64,
    /// Messages addressed to the viewer that are still unread.
    pub unread_count: u64,
}

/// Search entry point shared by all request handlers.
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn MarketplaceStore>,
    cache: CacheAside,
    ttl: TtlProfile,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn MarketplaceStore>, cache: CacheAside, ttl: TtlProfile) -> Self {
        Self { store, cache, ttl }
    }

    /// Messages in the viewer's jobs matching `filter`.
    ///
    /// A `job_id` outside the viewer's jobs yields an empty page rather
    /// than an error, so callers cannot probe for foreign job ids.
    pub async fn messages(
        &self,
        principal: &Principal,
        filter: MessageSearch,
    ) -> GigResult<Cached<SearchResult<Message>>> {
        let viewer = principal.user_id;
        let key = KeyNamespace::message_search(viewer, &filter);
        let store = Arc::clone(&self.store);
        let result = memoize(&self.cache, key, self.ttl.message_search, move || {
            find_messages(Arc::clone(&store), viewer, filter.clone())
        })
        .await?;

        debug!(
            viewer = %viewer,
            total = result.value().pagination.total,
            from_cache = result.from_cache(),
            "Message search"
        );
        Ok(result)
    }

    /// The viewer's job conversations, grouped and filtered after grouping.
    pub async fn conversations(
        &self,
        principal: &Principal,
        filter: ConversationSearch,
    ) -> GigResult<Cached<SearchResult<Conversation>>> {
        let viewer = principal.user_id;
        let key = KeyNamespace::conversation_search(viewer, &filter);
        let store = Arc::clone(&self.store);
        let result = memoize(&self.cache, key, self.ttl.conversation_search, move || {
            find_conversations(Arc::clone(&store), viewer, filter.clone())
        })
        .await?;

        debug!(
            viewer = %viewer,
            total = result.value().pagination.total,
            from_cache = result.from_cache(),
            "Conversation search"
        );
        Ok(result)
    }

    /// Users matching `filter`. Requires an admin principal; the check runs
    /// before any cache or store access.
    pub async fn users(
        &self,
        principal: &Principal,
        filter: UserSearch,
    ) -> GigResult<Cached<SearchResult<User>>> {
        require_admin(principal, "search users")?;

        let key = KeyNamespace::user_search(&filter);
        let store = Arc::clone(&self.store);
        let result = memoize(&self.cache, key, self.ttl.user_search, move || {
            find_users(Arc::clone(&store), filter.clone())
        })
        .await?;
        Ok(result)
    }

    /// Up to five distinct suggestions for a partial query. Queries shorter
    /// than two characters return an empty list without touching the store.
    /// User suggestions require an admin principal.
    pub async fn suggestions(
        &self,
        principal: &Principal,
        request: SuggestionRequest,
    ) -> GigResult<Cached<Vec<String>>> {
        if request.kind == SuggestionKind::Users {
            require_admin(principal, "suggest users")?;
        }
        if !request.is_searchable() {
            return Ok(Cached::computed(Vec::new()));
        }

        let viewer = principal.user_id;
        let key = Ok(KeyNamespace::suggestions(viewer, &request));
        let store = Arc::clone(&self.store);
        let kind = request.kind;
        let needle = request.normalized_query();
        let result = memoize(&self.cache, key, self.ttl.suggestions, move || {
            suggest(Arc::clone(&store), viewer, kind, needle.clone())
        })
        .await?;
        Ok(result)
    }
}

/// Reject non-admin principals before any filter is parsed or run.
pub fn require_admin(principal: &Principal, operation: &str) -> GigResult<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AuthorizationError::AdminRequired {
            operation: operation.to_string(),
        }
        .into())
    }
}

async fn find_messages(
    store: Arc<dyn MarketplaceStore>,
    viewer: UserId,
    filter: MessageSearch,
) -> StoreResult<SearchResult<Message>> {
    let scope: Vec<JobId> = store
        .jobs_for_participant(viewer, None)
        .await?
        .into_iter()
        .map(|job| job.job_id)
        .collect();

    if let Some(job_id) = filter.job_id {
        if !scope.contains(&job_id) {
            return Ok(SearchResult::empty(&filter.pagination));
        }
    }

    let query = MessageQuery {
        job_scope: Some(scope),
        job_id: filter.job_id,
        sender_id: filter.sender_id,
        receiver_id: filter.receiver_id,
        message_type: filter.message_type,
        has_attachment: filter.has_attachment,
        text: filter.query.clone(),
        created: filter.date_range,
        is_read: filter.is_read,
    };
    let sort = Sort::new(filter.sort_by, filter.sort_order);

    let (total, items) = tokio::try_join!(
        store.message_count(&query),
        store.message_find(&query, sort, filter.pagination),
    )?;
    Ok(SearchResult::new(items, filter.pagination.meta(total)))
}

async fn find_conversations(
    store: Arc<dyn MarketplaceStore>,
    viewer: UserId,
    filter: ConversationSearch,
) -> StoreResult<SearchResult<Conversation>> {
    let scope = ConversationScope {
        participant: viewer,
        job_status: filter.job_status,
    };
    let (rollups, jobs) = tokio::try_join!(
        store.conversation_rollup(scope),
        store.jobs_for_participant(viewer, filter.job_status),
    )?;
    let jobs: HashMap<JobId, _> = jobs.into_iter().map(|job| (job.job_id, job)).collect();

    let mut conversations: Vec<Conversation> = rollups
        .into_iter()
        .filter_map(|rollup| {
            // A job deleted between the two reads simply drops out.
            let job = jobs.get(&rollup.job_id)?;
            Some(Conversation {
                job_id: rollup.job_id,
                job_title: job.title.clone(),
                job_status: job.status,
                last_message: rollup.last_message,
                message_count: rollup.message_count,
                unread_count: rollup.unread_count,
            })
        })
        .filter(|c| conversation_matches(c, &filter))
        .collect();

    sort_conversations(&mut conversations, filter.sort_by, filter.sort_order);
    let total = conversations.len() as u64;
    Ok(SearchResult::new(
        filter.pagination.slice(conversations),
        filter.pagination.meta(total),
    ))
}

fn conversation_matches(conversation: &Conversation, filter: &ConversationSearch) -> bool {
    let unread_ok = filter
        .has_unread
        .map_or(true, |want| (conversation.unread_count > 0) == want);
    let text_ok = filter.query.as_deref().map_or(true, |text| {
        contains_ignore_case(&conversation.job_title, text)
            || contains_ignore_case(&conversation.last_message.message, text)
    });
    unread_ok && text_ok && filter.date_range.contains(conversation.last_message.created_at)
}

/// Sort by the computed field; ties go to the most recent last message.
pub(crate) fn sort_conversations(
    conversations: &mut [Conversation],
    field: ConversationSortField,
    direction: SortDirection,
) {
    conversations.sort_by(|a, b| {
        let primary = match field {
            ConversationSortField::LastMessageAt => a
                .last_message
                .created_at
                .cmp(&b.last_message.created_at),
            ConversationSortField::MessageCount => a.message_count.cmp(&b.message_count),
            ConversationSortField::UnreadCount => a.unread_count.cmp(&b.unread_count),
        };
        direction
            .apply(primary)
            .then_with(|| b.last_message.created_at.cmp(&a.last_message.created_at))
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
}

async fn find_users(
    store: Arc<dyn MarketplaceStore>,
    filter: UserSearch,
) -> StoreResult<SearchResult<User>> {
    let query = UserQuery {
        text: filter.query.clone(),
        role: filter.role,
        is_verified: filter.is_verified,
        created: filter.date_range,
    };
    let sort = Sort::new(filter.sort_by, filter.sort_order);
    let (total, items) = tokio::try_join!(
        store.user_count(&query),
        store.user_find(&query, sort, filter.pagination),
    )?;
    Ok(SearchResult::new(items, filter.pagination.meta(total)))
}

async fn suggest(
    store: Arc<dyn MarketplaceStore>,
    viewer: UserId,
    kind: SuggestionKind,
    needle: String,
) -> StoreResult<Vec<String>> {
    let page = Pagination::new(1, MAX_LIMIT).unwrap_or_default();
    let candidates: Vec<String> = match kind {
        SuggestionKind::Messages => {
            let scope = store
                .jobs_for_participant(viewer, None)
                .await?
                .into_iter()
                .map(|job| job.job_id)
                .collect();
            let query = MessageQuery {
                job_scope: Some(scope),
                text: Some(needle.clone()),
                ..Default::default()
            };
            store
                .message_find(&query, Sort::default(), page)
                .await?
                .into_iter()
                .map(|message| excerpt(&message.message))
                .collect()
        }
        // Job titles are public listings, so no participation scope.
        SuggestionKind::Jobs => {
            let query = JobQuery {
                text: Some(needle.clone()),
                ..Default::default()
            };
            store
                .job_find(&query, Sort::default(), page)
                .await?
                .into_iter()
                .map(|job| job.title)
                .collect()
        }
        SuggestionKind::Users => {
            let query = UserQuery {
                text: Some(needle.clone()),
                ..Default::default()
            };
            store
                .user_find(&query, Sort::default(), page)
                .await?
                .into_iter()
                .map(|user| user_label(user, &needle))
                .collect()
        }
    };
    Ok(distinct_suggestions(candidates))
}

/// The first of display name, email and phone that contains `needle`.
fn user_label(user: User, needle: &str) -> String {
    [user.display_name, user.email]
        .into_iter()
        .flatten()
        .find(|label| contains_ignore_case(label, needle))
        .unwrap_or(user.phone)
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SUGGESTION_EXCERPT_CHARS) {
        Some((end, _)) => trimmed[..end].to_string(),
        None => trimmed.to_string(),
    }
}

/// Trimmed, case-insensitively distinct, in input order, at most five.
pub(crate) fn distinct_suggestions(candidates: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|candidate| candidate.trim().to_string())
        .filter(|candidate| !candidate.is_empty())
        .filter(|candidate| seen.insert(candidate.to_lowercase()))
        .take(MAX_SUGGESTIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gigbridge_core::{EntityIdType, MessageId, MessageType};

    fn conversation(minute: u32, messages: u64, unread: u64) -> Conversation {
        let job_id = JobId::new();
        Conversation {
            job_id,
            job_title: format!("job {minute}"),
            job_status: JobStatus::Assigned,
            last_message: Message {
                message_id: MessageId::new(),
                job_id,
                sender_id: UserId::new(),
                receiver_id: UserId::new(),
                message: "hi".to_string(),
                message_type: MessageType::Text,
                attachment: None,
                is_read: unread == 0,
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            },
            message_count: messages,
            unread_count: unread,
        }
    }

    #[test]
    fn test_distinct_suggestions_dedupes_and_caps() {
        let out = distinct_suggestions(
            ["Plumber", "plumber ", "", "Painter", "Paver", "Pool", "Patio", "Porch"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(out, vec!["Plumber", "Painter", "Paver", "Pool", "Patio"]);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let long = "é".repeat(200);
        assert_eq!(excerpt(&long).chars().count(), SUGGESTION_EXCERPT_CHARS);
        assert_eq!(excerpt("  short  "), "short");
    }

    #[test]
    fn test_conversation_ties_break_on_latest_message() {
        let older = conversation(1, 4, 0);
        let newer = conversation(30, 4, 0);
        let busiest = conversation(10, 9, 0);
        let mut items = vec![older.clone(), busiest.clone(), newer.clone()];

        sort_conversations(&mut items, ConversationSortField::MessageCount, SortDirection::Desc);
        let order: Vec<JobId> = items.iter().map(|c| c.job_id).collect();
        assert_eq!(order, vec![busiest.job_id, newer.job_id, older.job_id]);

        sort_conversations(&mut items, ConversationSortField::MessageCount, SortDirection::Asc);
        let order: Vec<JobId> = items.iter().map(|c| c.job_id).collect();
        assert_eq!(order, vec![newer.job_id, older.job_id, busiest.job_id]);
    }

    #[test]
    fn test_has_unread_filter() {
        let filter = ConversationSearch {
            has_unread: Some(true),
            ..Default::default()
        };
        assert!(conversation_matches(&conversation(1, 3, 2), &filter));
        assert!(!conversation_matches(&conversation(1, 3, 0), &filter));

        let read_only = ConversationSearch {
            has_unread: Some(false),
            ..Default::default()
        };
        assert!(conversation_matches(&conversation(1, 3, 0), &read_only));
    }

    #[test]
    fn test_user_label_prefers_matching_field() {
        let user = User {
            user_id: UserId::new(),
            phone: "+15550123".to_string(),
            email: Some("ana@example.com".to_string()),
            display_name: Some("Ana Lopez".to_string()),
            role: gigbridge_core::UserRole::Client,
            is_verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user_label(user.clone(), "lop"), "Ana Lopez");
        assert_eq!(user_label(user.clone(), "example"), "ana@example.com");
        assert_eq!(user_label(user, "555"), "+15550123");
    }
}
