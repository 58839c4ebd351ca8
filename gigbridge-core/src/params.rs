//! Raw query-string parameters and their validation
//!
//! Every field arrives as an optional string exactly as the caller sent it.
//! `validate()` parses all of them, collecting every failure instead of
//! stopping at the first, and produces the typed filter for the target.

use crate::{
    AnalyticsWindow, ConversationSearch, DateRange, JobListing, MessageSearch, Pagination, SuggestionKind,
    SuggestionRequest, Timestamp, UserSearch, ValidationError, ValidationErrors, DEFAULT_LIMIT,
    DEFAULT_PAGE,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Parameters for `GET /search/messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchParams {
    pub query: Option<String>,
    pub job_id: Option<String>,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub message_type: Option<String>,
    pub has_attachment: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub is_read: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl MessageSearchParams {
    pub fn validate(&self) -> Result<MessageSearch, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let filter = MessageSearch {
            query: text(&self.query),
            job_id: parse_opt(&mut errors, "jobId", &self.job_id),
            sender_id: parse_opt(&mut errors, "senderId", &self.sender_id),
            receiver_id: parse_opt(&mut errors, "receiverId", &self.receiver_id),
            message_type: parse_opt(&mut errors, "messageType", &self.message_type),
            has_attachment: parse_bool(&mut errors, "hasAttachment", &self.has_attachment),
            date_range: parse_date_range(&mut errors, &self.date_from, &self.date_to),
            is_read: parse_bool(&mut errors, "isRead", &self.is_read),
            pagination: parse_pagination(&mut errors, &self.page, &self.limit),
            sort_by: parse_opt(&mut errors, "sortBy", &self.sort_by).unwrap_or_default(),
            sort_order: parse_opt(&mut errors, "sortOrder", &self.sort_order).unwrap_or_default(),
        };
        errors.into_result(filter)
    }
}

/// Parameters for `GET /search/conversations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSearchParams {
    pub query: Option<String>,
    pub job_status: Option<String>,
    pub has_unread: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ConversationSearchParams {
    pub fn validate(&self) -> Result<ConversationSearch, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let filter = ConversationSearch {
            query: text(&self.query),
            job_status: parse_opt(&mut errors, "jobStatus", &self.job_status),
            has_unread: parse_bool(&mut errors, "hasUnread", &self.has_unread),
            date_range: parse_date_range(&mut errors, &self.date_from, &self.date_to),
            pagination: parse_pagination(&mut errors, &self.page, &self.limit),
            sort_by: parse_opt(&mut errors, "sortBy", &self.sort_by).unwrap_or_default(),
            sort_order: parse_opt(&mut errors, "sortOrder", &self.sort_order).unwrap_or_default(),
        };
        errors.into_result(filter)
    }
}

/// Parameters for `GET /search/users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchParams {
    pub query: Option<String>,
    pub role: Option<String>,
    pub is_verified: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl UserSearchParams {
    pub fn validate(&self) -> Result<UserSearch, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let filter = UserSearch {
            query: text(&self.query),
            role: parse_opt(&mut errors, "role", &self.role),
            is_verified: parse_bool(&mut errors, "isVerified", &self.is_verified),
            date_range: parse_date_range(&mut errors, &self.date_from, &self.date_to),
            pagination: parse_pagination(&mut errors, &self.page, &self.limit),
            sort_by: parse_opt(&mut errors, "sortBy", &self.sort_by).unwrap_or_default(),
            sort_order: parse_opt(&mut errors, "sortOrder", &self.sort_order).unwrap_or_default(),
        };
        errors.into_result(filter)
    }
}

/// Parameters for `GET /jobs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListParams {
    pub query: Option<String>,
    pub status: Option<String>,
    pub client_id: Option<String>,
    pub freelancer_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl JobListParams {
    pub fn validate(&self) -> Result<JobListing, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let filter = JobListing {
            query: text(&self.query),
            status: parse_opt(&mut errors, "status", &self.status),
            client_id: parse_opt(&mut errors, "clientId", &self.client_id),
            freelancer_id: parse_opt(&mut errors, "freelancerId", &self.freelancer_id),
            date_range: parse_date_range(&mut errors, &self.date_from, &self.date_to),
            pagination: parse_pagination(&mut errors, &self.page, &self.limit),
            sort_by: parse_opt(&mut errors, "sortBy", &self.sort_by).unwrap_or_default(),
            sort_order: parse_opt(&mut errors, "sortOrder", &self.sort_order).unwrap_or_default(),
        };
        errors.into_result(filter)
    }
}

/// Parameters for `GET /search/suggestions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionParams {
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl SuggestionParams {
    /// Whether the caller asked for user suggestions, judged from the raw
    /// `type` alone so the admin check can run before validation.
    pub fn requests_users(&self) -> bool {
        present(&self.kind).and_then(|raw| raw.parse::<SuggestionKind>().ok())
            == Some(SuggestionKind::Users)
    }

    pub fn validate(&self) -> Result<SuggestionRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let kind: SuggestionKind = parse_opt(&mut errors, "type", &self.kind).unwrap_or_default();
        let query = self.query.clone().unwrap_or_default();
        errors.into_result(SuggestionRequest::new(query, kind))
    }
}

/// Parameters for every `GET /analytics/*` report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub time_range: Option<String>,
}

impl AnalyticsParams {
    pub fn validate(&self) -> Result<AnalyticsWindow, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let window = parse_opt(&mut errors, "timeRange", &self.time_range).unwrap_or_default();
        errors.into_result(window)
    }
}

/// Blank strings count as absent.
fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn text(raw: &Option<String>) -> Option<String> {
    present(raw).map(str::to_string)
}

fn parse_opt<T>(errors: &mut ValidationErrors, field: &str, raw: &Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = present(raw)?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            errors.push(ValidationError::invalid(field, value, e.to_string()));
            None
        }
    }
}

fn parse_bool(errors: &mut ValidationErrors, field: &str, raw: &Option<String>) -> Option<bool> {
    let value = present(raw)?;
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        errors.push(ValidationError::invalid(field, value, "expected true or false"));
        None
    }
}

fn parse_bounded(
    errors: &mut ValidationErrors,
    field: &str,
    raw: &Option<String>,
    default: u32,
    max: u32,
) -> Option<u32> {
    let Some(value) = present(raw) else {
        return Some(default);
    };
    match value.parse::<i64>() {
        Ok(n) if (1..=i64::from(max)).contains(&n) => u32::try_from(n).ok(),
        Ok(n) => {
            errors.push(ValidationError::OutOfRange {
                field: field.to_string(),
                min: 1,
                max: i64::from(max),
                got: n,
            });
            None
        }
        Err(_) => {
            errors.push(ValidationError::invalid(field, value, "expected an integer"));
            None
        }
    }
}

fn parse_pagination(
    errors: &mut ValidationErrors,
    page: &Option<String>,
    limit: &Option<String>,
) -> Pagination {
    let page = parse_bounded(errors, "page", page, DEFAULT_PAGE, u32::MAX);
    let limit = parse_bounded(errors, "limit", limit, DEFAULT_LIMIT, crate::MAX_LIMIT);
    match (page, limit) {
        (Some(page), Some(limit)) => Pagination::new(page, limit).unwrap_or_default(),
        _ => Pagination::default(),
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD`. A bare date resolves to the first
/// instant of that UTC day, or the last one when `end_of_day` is set.
pub fn parse_date(value: &str, end_of_day: bool) -> Result<Timestamp, String> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| "expected an ISO-8601 date or timestamp".to_string())?;
    let naive = if end_of_day {
        date.and_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    naive
        .map(|n| n.and_utc())
        .ok_or_else(|| "date out of range".to_string())
}

fn parse_date_range(
    errors: &mut ValidationErrors,
    from: &Option<String>,
    to: &Option<String>,
) -> DateRange {
    let mut date = |field: &str, raw: &Option<String>, end_of_day: bool| {
        let value = present(raw)?;
        match parse_date(value, end_of_day) {
            Ok(ts) => Some(ts),
            Err(reason) => {
                errors.push(ValidationError::invalid(field, value, reason));
                None
            }
        }
    };
    let date_from = date("dateFrom", from, false);
    let date_to = date("dateTo", to, true);

    if let (Some(f), Some(t)) = (date_from, date_to) {
        if f > t {
            errors.push(ValidationError::InvertedDateRange {
                from: f.to_rfc3339(),
                to: t.to_rfc3339(),
            });
        }
    }
    DateRange::new(date_from, date_to)
}
