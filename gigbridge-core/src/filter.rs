//! Typed search filters and pagination
//!
//! One closed filter type per search target. Raw request parameters are
//! turned into these by the `params` module; nothing here parses strings.

use crate::{
    ConversationSortField, JobId, JobSortField, JobStatus, MessageSortField, MessageType, SortDirection,
    SuggestionKind, Timestamp, UserId, UserRole, UserSortField, ValidationError, ValidationErrors,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Maximum number of entries a suggestion list carries.
pub const MAX_SUGGESTIONS: usize = 5;

/// Minimum trimmed query length before suggestions are looked up.
pub const MIN_SUGGESTION_QUERY_CHARS: usize = 2;

/// A validated page request. `page >= 1` and `1 <= limit <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if page < 1 {
            errors.push(ValidationError::OutOfRange {
                field: "page".to_string(),
                min: 1,
                max: i64::from(u32::MAX),
                got: i64::from(page),
            });
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            errors.push(ValidationError::OutOfRange {
                field: "limit".to_string(),
                min: 1,
                max: i64::from(MAX_LIMIT),
                got: i64::from(limit),
            });
        }
        errors.into_result(Self { page, limit })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of items skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Cut this page out of an already sorted, fully materialized result.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .into_iter()
            .skip(offset)
            .take(self.limit as usize)
            .collect()
    }

    pub fn meta(&self, total: u64) -> PaginationMeta {
        PaginationMeta::new(self.page, self.limit, total)
    }
}

/// Pagination block returned with every search result.
///
/// `pages` is derived from `total` on construction and on deserialization,
/// so a cached copy can never disagree with its own total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(from = "RawPaginationMeta")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Deserialize)]
struct RawPaginationMeta {
    page: u32,
    limit: u32,
    total: u64,
}

impl From<RawPaginationMeta> for PaginationMeta {
    fn from(raw: RawPaginationMeta) -> Self {
        PaginationMeta::new(raw.page, raw.limit, raw.total)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> SearchResult<T> {
    pub fn new(items: Vec<T>, pagination: PaginationMeta) -> Self {
        Self { items, pagination }
    }

    pub fn empty(pagination: &Pagination) -> Self {
        Self {
            items: Vec::new(),
            pagination: pagination.meta(0),
        }
    }
}

/// Inclusive `[from, to]` time interval; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Timestamp>,
}

impl DateRange {
    pub fn new(from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

/// Message search criteria. The viewer restriction is applied by the engine,
/// not carried here, so one filter can be shared across cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearch {
    pub query: Option<String>,
    pub job_id: Option<JobId>,
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub message_type: Option<MessageType>,
    pub has_attachment: Option<bool>,
    pub date_range: DateRange,
    pub is_read: Option<bool>,
    pub pagination: Pagination,
    pub sort_by: MessageSortField,
    pub sort_order: SortDirection,
}

/// Conversation search criteria. Everything except `job_status` is
/// evaluated after messages are grouped per job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSearch {
    pub query: Option<String>,
    pub job_status: Option<JobStatus>,
    pub has_unread: Option<bool>,
    pub date_range: DateRange,
    pub pagination: Pagination,
    pub sort_by: ConversationSortField,
    pub sort_order: SortDirection,
}

/// User search criteria. Admin only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearch {
    pub query: Option<String>,
    pub role: Option<UserRole>,
    pub is_verified: Option<bool>,
    pub date_range: DateRange,
    pub pagination: Pagination,
    pub sort_by: UserSortField,
    pub sort_order: SortDirection,
}

/// Job listing criteria. Participation scoping is added by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub query: Option<String>,
    pub status: Option<JobStatus>,
    pub client_id: Option<UserId>,
    pub freelancer_id: Option<UserId>,
    pub date_range: DateRange,
    pub pagination: Pagination,
    pub sort_by: JobSortField,
    pub sort_order: SortDirection,
}

/// Autocomplete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub query: String,
    pub kind: SuggestionKind,
}

impl SuggestionRequest {
    pub fn new(query: impl Into<String>, kind: SuggestionKind) -> Self {
        Self {
            query: query.into().trim().to_string(),
            kind,
        }
    }

    /// Lowercased query used for matching and for the cache key.
    pub fn normalized_query(&self) -> String {
        self.query.trim().to_lowercase()
    }

    /// Queries shorter than two characters are never looked up.
    pub fn is_searchable(&self) -> bool {
        self.query.trim().chars().count() >= MIN_SUGGESTION_QUERY_CHARS
    }
}

/// Case-insensitive substring match used by every free-text predicate.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_rejects_out_of_range() {
        let err = Pagination::new(0, 101).unwrap_err();
        assert!(err.has_field("page"));
        assert!(err.has_field("limit"));
        assert!(Pagination::new(1, 0).is_err());
        assert!(Pagination::new(3, 100).is_ok());
    }

    #[test]
    fn test_pagination_slice() {
        let p = Pagination::new(2, 20).unwrap();
        let page: Vec<u32> = p.slice((0..23).collect());
        assert_eq!(page, vec![20, 21, 22]);

        let beyond = Pagination::new(5, 20).unwrap();
        assert!(beyond.slice((0..23).collect::<Vec<u32>>()).is_empty());
    }

    #[test]
    fn test_pagination_meta_pages() {
        assert_eq!(PaginationMeta::new(1, 20, 23).pages, 2);
        assert_eq!(PaginationMeta::new(1, 20, 20).pages, 1);
        assert_eq!(PaginationMeta::new(1, 20, 0).pages, 0);
    }

    #[test]
    fn test_pagination_meta_recomputes_pages_on_deserialize() {
        let json = r#"{"page":1,"limit":10,"total":31,"pages":999}"#;
        let meta: PaginationMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.pages, 4);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let range = DateRange::new(Some(from), Some(to));

        assert!(range.contains(from));
        assert!(range.contains(to));
        assert!(!range.contains(to + chrono::Duration::seconds(1)));
        assert!(DateRange::default().contains(from));
    }

    #[test]
    fn test_suggestion_request_min_length() {
        assert!(!SuggestionRequest::new(" a ", SuggestionKind::Jobs).is_searchable());
        assert!(SuggestionRequest::new("Pl", SuggestionKind::Jobs).is_searchable());
        assert_eq!(
            SuggestionRequest::new(" PLumb ", SuggestionKind::Jobs).normalized_query(),
            "plumb"
        );
    }
}
