//! OpenAPI Specification for the GigBridge API
//!
//! Generated by utoipa from route annotations and schema derives. Served at
//! `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{analytics, health, marketplace, search};
use crate::telemetry::metrics;

use gigbridge_core::{
    Attachment, FieldViolation, Job, JobStatus, Message, MessageType, Notification,
    NotificationKind, PaginationMeta, SortDirection, SuggestionKind, User, UserRole,
};
use gigbridge_query::{
    Conversation, CountEntry, FileEntry, FileReport, HourCount, MessageReport,
    NotificationReport, PlatformReport, ReportPeriod, UserReport,
};

/// OpenAPI document for the GigBridge API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GigBridge API",
        version = "0.1.0",
        description = "Search, analytics and cached entity access for the GigBridge service marketplace",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "GigBridge", url = "https://gigbridge.dev")
    ),
    servers(
        (url = "https://api.gigbridge.dev", description = "Production"),
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Search", description = "Message, conversation and user search plus suggestions"),
        (name = "Analytics", description = "Admin-only activity reports"),
        (name = "Users", description = "Cached user profiles"),
        (name = "Jobs", description = "Job listing, lookup and read receipts"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        search::search_messages,
        search::search_conversations,
        search::search_users,
        search::suggestions,
        analytics::message_report,
        analytics::file_report,
        analytics::user_report,
        analytics::notification_report,
        analytics::platform_report,
        marketplace::get_user,
        marketplace::list_jobs,
        marketplace::get_job,
        marketplace::mark_read,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        FieldViolation,
        PaginationMeta,
        User,
        UserRole,
        Job,
        JobStatus,
        Message,
        MessageType,
        Attachment,
        Notification,
        NotificationKind,
        SortDirection,
        SuggestionKind,
        Conversation,
        CountEntry,
        FileEntry,
        HourCount,
        ReportPeriod,
        MessageReport,
        FileReport,
        UserReport,
        NotificationReport,
        PlatformReport,
        search::MessageSearchData,
        search::ConversationSearchData,
        search::UserSearchData,
        search::SuggestionData,
        marketplace::JobListData,
        marketplace::MarkReadData,
        health::HealthResponse,
        health::HealthStatus,
        health::ReadinessDetails,
        health::ProbeResult,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/search/messages",
            "/search/conversations",
            "/search/users",
            "/search/suggestions",
            "/analytics/messages",
            "/analytics/files",
            "/analytics/users",
            "/analytics/notifications",
            "/analytics/platform",
            "/users/{id}",
            "/jobs",
            "/jobs/{id}",
            "/jobs/{id}/mark-read",
            "/health/ping",
            "/health/live",
            "/health/ready",
            "/metrics",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn test_openapi_serializes() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(ApiDoc::openapi())?;
        assert_eq!(json["info"]["title"], "GigBridge API");
        assert!(json["components"]["schemas"]["ApiError"].is_object());
        assert!(json["components"]["schemas"]["PlatformReport"].is_object());
        Ok(())
    }
}
