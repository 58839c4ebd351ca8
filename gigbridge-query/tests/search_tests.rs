//! Search engine behavior against a seeded in-memory marketplace.
//!
//! Covers pagination math, attachment and unread facets, authorization
//! scoping, suggestions, memoization and write-then-invalidate.

use futures_util::future::join_all;
use gigbridge_core::{
    ConversationSearch, ConversationSearchParams, FixedClock, MessageSearchParams, Pagination,
    SuggestionKind, SuggestionRequest, UserSearchParams,
};
use gigbridge_query::QueryLayer;
use gigbridge_storage::{InMemoryCacheStore, MarketplaceStore, TtlProfile};
use gigbridge_test_utils::assertions::{assert_admin_required, assert_page_meta};
use gigbridge_test_utils::fixtures::{self, Marketplace};
use gigbridge_test_utils::{JobStatus, MessageId, Principal};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn layer(market: &Marketplace) -> (Arc<InMemoryCacheStore>, QueryLayer) {
    let (cache_store, cache) = fixtures::cache(Duration::from_secs(5));
    let store: Arc<dyn MarketplaceStore> = market.store.clone();
    let clock = Arc::new(FixedClock::new(fixtures::base_time()));
    let layer = QueryLayer::new(store, cache, clock, TtlProfile::default());
    (cache_store, layer)
}

fn message_params(page: u32, limit: u32) -> MessageSearchParams {
    MessageSearchParams {
        page: Some(page.to_string()),
        limit: Some(limit.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// MESSAGE SEARCH
// ============================================================================

#[tokio::test]
async fn test_twenty_three_matches_split_over_two_pages() {
    let market = Marketplace::two_party();
    market.seed_messages(23);
    let (_, layer) = layer(&market);
    let principal = market.client_principal();

    let first = layer
        .search
        .messages(&principal, message_params(1, 20).validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert_eq!(first.items.len(), 20);
    assert_page_meta(&first.pagination, 1, 20, 23);

    let second = layer
        .search
        .messages(&principal, message_params(2, 20).validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert_eq!(second.items.len(), 3);
    assert_eq!(second.pagination.pages, 2);

    // Default order is newest first.
    assert_eq!(first.items[0].message, "update 22");
    assert_eq!(second.items[2].message, "update 0");
}

#[tokio::test]
async fn test_has_attachment_keeps_only_attached_messages() {
    let market = Marketplace::two_party();
    market.seed_messages(3);
    let (client, freelancer) = (market.client.user_id, market.freelancer.user_id);
    market
        .store
        .insert_messages([
            fixtures::file_message(&market.job, client, freelancer, "image/png", 512, fixtures::minutes(10)),
            fixtures::file_message(&market.job, freelancer, client, "application/pdf", 4096, fixtures::minutes(11)),
        ])
        .unwrap();
    let (_, layer) = layer(&market);

    let params = MessageSearchParams {
        has_attachment: Some("true".to_string()),
        ..Default::default()
    };
    let result = layer
        .search
        .messages(&market.client_principal(), params.validate().unwrap())
        .await
        .unwrap()
        .into_value();

    assert_eq!(result.items.len(), 2);
    assert_eq!(result.pagination.total, 2);
    assert!(result.items.iter().all(|m| m.has_attachment()));
}

#[tokio::test]
async fn test_blank_query_matches_everything() {
    let market = Marketplace::two_party();
    market.seed_messages(4);
    let (_, layer) = layer(&market);

    let params = MessageSearchParams {
        query: Some("   ".to_string()),
        ..Default::default()
    };
    let result = layer
        .search
        .messages(&market.freelancer_principal(), params.validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert_eq!(result.pagination.total, 4);
}

#[tokio::test]
async fn test_outsider_sees_no_messages_even_with_job_id() {
    let market = Marketplace::two_party();
    market.seed_messages(5);
    let (_, layer) = layer(&market);

    let params = MessageSearchParams {
        job_id: Some(market.job.job_id.to_string()),
        ..Default::default()
    };
    let result = layer
        .search
        .messages(&market.outsider_principal(), params.validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert!(result.items.is_empty());
    assert_page_meta(&result.pagination, 1, 20, 0);
}

#[tokio::test]
async fn test_concurrent_identical_searches_compute_once() {
    let market = Marketplace::two_party();
    market.seed_messages(6);
    let (_, layer) = layer(&market);
    let principal = market.client_principal();
    let filter = message_params(1, 5).validate().unwrap();
    market.store.reset_query_count();

    let results = join_all(
        (0..16).map(|_| layer.search.messages(&principal, filter.clone())),
    )
    .await;

    let computed = results
        .iter()
        .map(|r| r.as_ref().unwrap())
        .filter(|r| !r.from_cache())
        .count();
    assert!(computed >= 1);
    // Participant scope, count and find: one computation's worth of reads.
    assert_eq!(market.store.query_count(), 3);
    for result in &results {
        assert_eq!(result.as_ref().unwrap().value().pagination.total, 6);
    }
}

// ============================================================================
// CONVERSATION SEARCH
// ============================================================================

#[tokio::test]
async fn test_has_unread_excludes_fully_read_conversations() {
    let market = Marketplace::two_party();
    let (quiet_job, other_freelancer) = market.add_job("Paint fence", JobStatus::InProgress);
    market
        .store
        .insert_messages([
            fixtures::message(
                &market.job,
                market.freelancer.user_id,
                market.client.user_id,
                "Sink fixed",
                fixtures::minutes(1),
            ),
            fixtures::message(
                &quiet_job,
                market.client.user_id,
                other_freelancer.user_id,
                "Start Monday?",
                fixtures::minutes(2),
            ),
        ])
        .unwrap();
    let (_, layer) = layer(&market);

    let all = layer
        .search
        .conversations(&market.client_principal(), ConversationSearch::default())
        .await
        .unwrap()
        .into_value();
    assert_eq!(all.pagination.total, 2);

    let params = ConversationSearchParams {
        has_unread: Some("true".to_string()),
        ..Default::default()
    };
    let unread = layer
        .search
        .conversations(&market.client_principal(), params.validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert_eq!(unread.items.len(), 1);
    assert_eq!(unread.items[0].job_id, market.job.job_id);
    assert_eq!(unread.items[0].unread_count, 1);
    assert_eq!(unread.items[0].job_title, "Fix kitchen sink");
}

#[tokio::test]
async fn test_conversation_text_matches_job_title() {
    let market = Marketplace::two_party();
    market.seed_messages(2);
    let (_, layer) = layer(&market);

    let params = ConversationSearchParams {
        query: Some("KITCHEN".to_string()),
        ..Default::default()
    };
    let found = layer
        .search
        .conversations(&market.freelancer_principal(), params.validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].message_count, 2);
    assert_eq!(found.items[0].last_message.message, "update 1");
}

#[tokio::test]
async fn test_mark_read_invalidates_cached_conversations() {
    let market = Marketplace::two_party();
    market.seed_messages(3);
    let (cache_store, layer) = layer(&market);
    let freelancer = market.freelancer_principal();

    let before = layer
        .search
        .conversations(&freelancer, ConversationSearch::default())
        .await
        .unwrap();
    assert!(!before.from_cache());
    assert_eq!(before.value().items[0].unread_count, 3);

    let cached = layer
        .search
        .conversations(&freelancer, ConversationSearch::default())
        .await
        .unwrap();
    assert!(cached.from_cache());

    let report = layer
        .marketplace
        .mark_read(market.job.job_id, market.freelancer.user_id)
        .await
        .unwrap();
    assert!(report.is_clean());
    assert!(cache_store
        .keys()
        .iter()
        .all(|k| !k.starts_with("conversation:search:")));

    let after = layer
        .search
        .conversations(&freelancer, ConversationSearch::default())
        .await
        .unwrap();
    assert!(!after.from_cache());
    assert_eq!(after.value().items[0].unread_count, 0);
}

// ============================================================================
// USER SEARCH AND SUGGESTIONS
// ============================================================================

#[tokio::test]
async fn test_user_search_requires_admin_before_touching_store() {
    let market = Marketplace::two_party();
    let (cache_store, layer) = layer(&market);
    market.store.reset_query_count();

    let denied = layer
        .search
        .users(&market.client_principal(), UserSearchParams::default().validate().unwrap())
        .await;
    assert_admin_required(&denied);
    assert_eq!(market.store.query_count(), 0);
    assert_eq!(cache_store.operation_count(), 0);

    let params = UserSearchParams {
        role: Some("freelancer".to_string()),
        ..Default::default()
    };
    let found = layer
        .search
        .users(&market.admin_principal(), params.validate().unwrap())
        .await
        .unwrap()
        .into_value();
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].user_id, market.freelancer.user_id);
}

#[tokio::test]
async fn test_suggestions_are_distinct_and_capped() {
    let market = Marketplace::two_party();
    market.seed_messages(8);
    let (_, layer) = layer(&market);
    let principal = market.client_principal();

    let suggestions = layer
        .search
        .suggestions(&principal, SuggestionRequest::new("UPD", SuggestionKind::Messages))
        .await
        .unwrap()
        .into_value();
    assert_eq!(suggestions.len(), 5);
    let distinct: HashSet<&String> = suggestions.iter().collect();
    assert_eq!(distinct.len(), 5);

    let jobs = layer
        .search
        .suggestions(&principal, SuggestionRequest::new("sink", SuggestionKind::Jobs))
        .await
        .unwrap()
        .into_value();
    assert_eq!(jobs, vec!["Fix kitchen sink".to_string()]);
}

#[tokio::test]
async fn test_short_suggestion_query_is_empty_without_lookup() {
    let market = Marketplace::two_party();
    market.seed_messages(3);
    let (cache_store, layer) = layer(&market);
    market.store.reset_query_count();

    let suggestions = layer
        .search
        .suggestions(
            &market.client_principal(),
            SuggestionRequest::new(" u ", SuggestionKind::Messages),
        )
        .await
        .unwrap();
    assert!(suggestions.value().is_empty());
    assert_eq!(market.store.query_count(), 0);
    assert_eq!(cache_store.operation_count(), 0);
}

#[tokio::test]
async fn test_user_suggestions_require_admin() {
    let market = Marketplace::two_party();
    let (_, layer) = layer(&market);
    let result = layer
        .search
        .suggestions(
            &market.freelancer_principal(),
            SuggestionRequest::new("+1555", SuggestionKind::Users),
        )
        .await;
    assert_admin_required(&result);
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn collect_all_pages(count: usize, limit: u32) -> (usize, HashSet<MessageId>, u64) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build test runtime");

    runtime.block_on(async {
        let market = Marketplace::two_party();
        market.seed_messages(count);
        let (_, layer) = layer(&market);
        let principal: Principal = market.client_principal();

        let first = layer
            .search
            .messages(&principal, message_params(1, limit).validate().unwrap())
            .await
            .unwrap()
            .into_value();
        let pages = first.pagination.pages;

        let mut seen = HashSet::new();
        let mut fetched = 0;
        // Walk pages last to first; order of retrieval must not matter.
        for page in (1..=pages).rev() {
            let filter = gigbridge_core::MessageSearch {
                pagination: Pagination::new(page as u32, limit).unwrap(),
                ..Default::default()
            };
            let result = layer
                .search
                .messages(&principal, filter)
                .await
                .unwrap()
                .into_value();
            fetched += result.items.len();
            seen.extend(result.items.iter().map(|m| m.message_id));
        }
        (fetched, seen, pages)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_pages_concatenate_to_full_set(count in 0usize..45, limit in 1u32..=10) {
        let (fetched, seen, pages) = collect_all_pages(count, limit);
        prop_assert_eq!(pages, (count as u64).div_ceil(u64::from(limit)));
        prop_assert_eq!(fetched, count);
        prop_assert_eq!(seen.len(), count);
    }
}
