//! Deterministic cache key construction.
//!
//! Keys look like `<entity kind>:<discriminator>`. A discriminator is either
//! a single id or the canonical JSON of a filter, so two logically equal
//! queries always land on the same key regardless of field order.

use gigbridge_core::{
    AnalyticsWindow, CacheError, ConversationSearch, EntityKind, JobId, MessageSearch,
    Pagination, SuggestionKind, SuggestionRequest, UserId, UserSearch,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use uuid::Uuid;

/// Analytics report families, as they appear in keys and routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Messages,
    Files,
    Users,
    Notifications,
    Platform,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Messages => "messages",
            ReportKind::Files => "files",
            ReportKind::Users => "users",
            ReportKind::Notifications => "notifications",
            ReportKind::Platform => "platform",
        }
    }
}

/// Serialize `value` as canonical JSON: object keys sorted at every depth,
/// `null` members dropped, no whitespace.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
    let json = serde_json::to_value(value).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    let mut out = String::new();
    write_canonical(&json, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // A `String` always serializes.
                let _ = write!(out, "{}", Value::String(k.clone()));
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => {
            let _ = write!(out, "{}", leaf);
        }
    }
}

/// Key builders for every cached result family.
pub struct KeyNamespace;

impl KeyNamespace {
    /// `<kind>:<id>`
    pub fn entity(kind: EntityKind, id: Uuid) -> String {
        format!("{}:{}", kind.as_str(), id)
    }

    pub fn user(id: UserId) -> String {
        format!("user:{}", id)
    }

    pub fn job(id: JobId) -> String {
        format!("job:{}", id)
    }

    /// `job:list:<canonical(filters)>:<page>:<limit>`
    pub fn job_list<F: Serialize + ?Sized>(
        filters: &F,
        pagination: &Pagination,
    ) -> Result<String, CacheError> {
        Ok(format!(
            "job:list:{}:{}:{}",
            canonical_json(filters)?,
            pagination.page(),
            pagination.limit()
        ))
    }

    /// `message:search:<viewer>:<canonical(filter)>`
    pub fn message_search(viewer: UserId, filter: &MessageSearch) -> Result<String, CacheError> {
        let keyed = MessageSearch {
            query: fold_text(&filter.query),
            ..filter.clone()
        };
        Ok(format!("message:search:{}:{}", viewer, canonical_json(&keyed)?))
    }

    /// `conversation:search:<viewer>:<canonical(filter)>`
    pub fn conversation_search(
        viewer: UserId,
        filter: &ConversationSearch,
    ) -> Result<String, CacheError> {
        let keyed = ConversationSearch {
            query: fold_text(&filter.query),
            ..filter.clone()
        };
        Ok(format!(
            "conversation:search:{}:{}",
            viewer,
            canonical_json(&keyed)?
        ))
    }

    /// `user:search:<canonical(filter)>`
    pub fn user_search(filter: &UserSearch) -> Result<String, CacheError> {
        let keyed = UserSearch {
            query: fold_text(&filter.query),
            ..filter.clone()
        };
        Ok(format!("user:search:{}", canonical_json(&keyed)?))
    }

    /// `suggestion:<kind>:<viewer>:<normalized query>`
    pub fn suggestions(viewer: UserId, request: &SuggestionRequest) -> String {
        format!(
            "suggestion:{}:{}:{}",
            request.kind.as_str(),
            viewer,
            request.normalized_query()
        )
    }

    /// `analytics:<report>:<window>`
    pub fn analytics(report: ReportKind, window: AnalyticsWindow) -> String {
        format!("analytics:{}:{}", report.as_str(), window.as_str())
    }

    /// `<kind>:list:`
    pub fn list_prefix(kind: EntityKind) -> String {
        format!("{}:list:", kind.as_str())
    }

    /// `<kind>:search:`
    pub fn search_prefix(kind: EntityKind) -> String {
        format!("{}:search:", kind.as_str())
    }

    /// `suggestion:<kind>:`
    pub fn suggestion_prefix(kind: SuggestionKind) -> String {
        format!("suggestion:{}:", kind.as_str())
    }

    /// `analytics:<report>:`
    pub fn analytics_prefix(report: ReportKind) -> String {
        format!("analytics:{}:", report.as_str())
    }
}

/// Text matching ignores case, so keys do too.
pub fn fold_text(text: &Option<String>) -> Option<String> {
    text.as_deref().map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigbridge_core::{EntityIdType, MessageType, SortDirection};
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_and_drops_nulls() {
        let a = json!({"b": 1, "a": {"z": null, "y": [3, {"d": 1, "c": 2}]}, "n": null});
        assert_eq!(
            canonical_json(&a).unwrap(),
            r#"{"a":{"y":[3,{"c":2,"d":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_insertion_order_independent() {
        let mut first = serde_json::Map::new();
        first.insert("status".to_string(), json!("pending"));
        first.insert("clientId".to_string(), json!("abc"));
        let mut second = serde_json::Map::new();
        second.insert("clientId".to_string(), json!("abc"));
        second.insert("status".to_string(), json!("pending"));

        assert_eq!(
            canonical_json(&Value::Object(first)).unwrap(),
            canonical_json(&Value::Object(second)).unwrap()
        );
    }

    #[test]
    fn test_entity_keys() {
        let id = UserId::from_uuid(Uuid::nil());
        assert_eq!(
            KeyNamespace::user(id),
            "user:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            KeyNamespace::entity(EntityKind::Message, Uuid::nil()),
            "message:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_job_list_key_shape() {
        let filters = json!({"status": "pending"});
        let key = KeyNamespace::job_list(&filters, &Pagination::new(2, 50).unwrap()).unwrap();
        assert_eq!(key, r#"job:list:{"status":"pending"}:2:50"#);
        assert!(key.starts_with(&KeyNamespace::list_prefix(EntityKind::Job)));
    }

    #[test]
    fn test_message_search_key_is_viewer_scoped() {
        let filter = MessageSearch {
            message_type: Some(MessageType::File),
            sort_order: SortDirection::Asc,
            ..Default::default()
        };
        let alice = UserId::new();
        let bob = UserId::new();
        let a = KeyNamespace::message_search(alice, &filter).unwrap();
        let b = KeyNamespace::message_search(bob, &filter).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("message:search:"));
        assert!(a.contains(r#""messageType":"file""#));
        assert!(!a.contains("null"));
    }

    #[test]
    fn test_search_keys_ignore_query_case() {
        let viewer = UserId::new();
        let search = |text: &str| MessageSearch {
            query: Some(text.to_string()),
            ..Default::default()
        };
        let upper = search("Plumb");
        assert_eq!(
            KeyNamespace::message_search(viewer, &upper).unwrap(),
            KeyNamespace::message_search(viewer, &search("plumb")).unwrap()
        );
        // The filter itself keeps the caller's spelling.
        assert_eq!(upper.query.as_deref(), Some("Plumb"));

        let conversations = |text: &str| ConversationSearch {
            query: Some(text.to_string()),
            ..Default::default()
        };
        assert_eq!(
            KeyNamespace::conversation_search(viewer, &conversations("TILE")).unwrap(),
            KeyNamespace::conversation_search(viewer, &conversations("tile")).unwrap()
        );

        let users = |text: &str| UserSearch {
            query: Some(text.to_string()),
            ..Default::default()
        };
        assert_eq!(
            KeyNamespace::user_search(&users("Ana@Example.com")).unwrap(),
            KeyNamespace::user_search(&users("ana@example.com")).unwrap()
        );
    }

    #[test]
    fn test_suggestion_key_normalizes_query() {
        let viewer = UserId::from_uuid(Uuid::nil());
        let upper = SuggestionRequest::new("  PLumb", SuggestionKind::Jobs);
        let lower = SuggestionRequest::new("plumb ", SuggestionKind::Jobs);
        assert_eq!(
            KeyNamespace::suggestions(viewer, &upper),
            KeyNamespace::suggestions(viewer, &lower)
        );
        assert!(KeyNamespace::suggestions(viewer, &upper)
            .starts_with(&KeyNamespace::suggestion_prefix(SuggestionKind::Jobs)));
    }

    #[test]
    fn test_analytics_key() {
        assert_eq!(
            KeyNamespace::analytics(ReportKind::Platform, AnalyticsWindow::OneDay),
            "analytics:platform:1d"
        );
    }
}
