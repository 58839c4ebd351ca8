//! Property-Based Tests for the Cache Layer
//!
//! Properties:
//! - `set(k, v, ttl)` then `get(k)` within `ttl` returns `v`
//! - `delete(k)` then `get(k)` is a miss regardless of prior state
//! - logically equal filters produce byte-identical keys
//! - an unavailable store never fails `get_or_compute`

use gigbridge_core::{
    DateRange, EntityIdType, MessageSearch, MessageType, Pagination, SortDirection, UserId,
};
use gigbridge_storage::{
    canonical_json, CacheAside, CacheStore, InMemoryCacheStore, KeyNamespace,
};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("Failed to build test runtime")
}

// ============================================================================
// STRATEGIES
// ============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "user:[0-9a-f]{8}",
        "message:search:[a-z]{1,10}:\\{\"page\":[0-9]{1,3}\\}",
        "suggestion:jobs:[a-z0-9]{1,12}",
    ]
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,40}",
        Just("{\"a\":1}".to_string()),
        Just("null".to_string()),
    ]
}

fn message_search_strategy() -> impl Strategy<Value = MessageSearch> {
    (
        proptest::option::of("[a-z]{1,12}"),
        proptest::option::of(prop_oneof![
            Just(MessageType::Text),
            Just(MessageType::Image),
            Just(MessageType::File),
        ]),
        proptest::option::of(any::<bool>()),
        1u32..50,
        1u32..=100,
        any::<bool>(),
    )
        .prop_map(|(query, message_type, has_attachment, page, limit, asc)| MessageSearch {
            query,
            message_type,
            has_attachment,
            date_range: DateRange::default(),
            pagination: Pagination::new(page, limit).unwrap_or_default(),
            sort_order: if asc {
                SortDirection::Asc
            } else {
                SortDirection::Desc
            },
            ..Default::default()
        })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_set_then_get_round_trips(key in key_strategy(), value in value_strategy()) {
        let store = InMemoryCacheStore::new();
        let got = runtime().block_on(async {
            store.set(&key, &value, Duration::from_secs(60)).await.unwrap();
            store.get(&key).await.unwrap()
        });
        prop_assert_eq!(got, Some(value));
    }

    #[test]
    fn prop_delete_then_get_misses(
        key in key_strategy(),
        value in value_strategy(),
        populated in any::<bool>(),
    ) {
        let store = InMemoryCacheStore::new();
        let got = runtime().block_on(async {
            if populated {
                store.set(&key, &value, Duration::from_secs(60)).await.unwrap();
            }
            let was_present = store.delete(&key).await.unwrap();
            assert_eq!(was_present, populated);
            store.get(&key).await.unwrap()
        });
        prop_assert_eq!(got, None);
    }

    #[test]
    fn prop_equal_filters_share_a_key(filter in message_search_strategy()) {
        let viewer = UserId::from_uuid(uuid::Uuid::nil());
        let first = KeyNamespace::message_search(viewer, &filter).unwrap();
        let second = KeyNamespace::message_search(viewer, &filter.clone()).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.starts_with("message:search:"));
    }

    #[test]
    fn prop_canonical_json_ignores_insertion_order(
        pairs in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..8)
    ) {
        let forward: Map<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        let backward: Map<String, Value> = pairs
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        prop_assert_eq!(
            canonical_json(&Value::Object(forward)).unwrap(),
            canonical_json(&Value::Object(backward)).unwrap()
        );
    }
}

#[test]
fn test_distinct_filters_get_distinct_keys() {
    let viewer = UserId::new();
    let text = MessageSearch {
        message_type: Some(MessageType::Text),
        ..Default::default()
    };
    let image = MessageSearch {
        message_type: Some(MessageType::Image),
        ..Default::default()
    };
    assert_ne!(
        KeyNamespace::message_search(viewer, &text).unwrap(),
        KeyNamespace::message_search(viewer, &image).unwrap()
    );
    assert_ne!(
        KeyNamespace::message_search(viewer, &text).unwrap(),
        KeyNamespace::message_search(UserId::new(), &text).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let store = InMemoryCacheStore::new();
    store
        .set("user:1", "alice", Duration::from_secs(30))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("alice"));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(store.get("user:1").await.unwrap(), None);
    assert!(!store.exists("user:1").await.unwrap());
}

#[tokio::test]
async fn test_unavailable_store_still_computes() {
    let store = Arc::new(InMemoryCacheStore::new());
    store.set_available(false);
    let cache = CacheAside::new(store.clone(), Duration::from_secs(5));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let result = cache
            .get_or_compute("analytics:messages:7d", Duration::from_secs(60), move || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![1u64, 2, 3])
                }
            })
            .await
            .unwrap();

        assert!(!result.from_cache());
        assert_eq!(result.value(), &vec![1, 2, 3]);
    }

    // Nothing could be cached, so each call computed.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    store.set_available(true);
    assert!(store.is_empty());
}
