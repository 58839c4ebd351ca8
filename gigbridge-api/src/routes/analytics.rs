//! Analytics Routes
//!
//! `GET /analytics/{messages,files,users,notifications,platform}?timeRange=`.
//! Every report is admin only and memoized per window.

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use gigbridge_core::{AnalyticsParams, AnalyticsWindow, Principal};
use gigbridge_query::{
    require_admin, FileReport, MessageReport, NotificationReport, PlatformReport, QueryLayer,
    UserReport,
};

use super::cached_response;
use crate::{
    error::{ApiError, ApiResult},
    extractors::PrincipalExtractor,
    state::AppState,
};

/// Authorization comes first: a non-admin gets 403 whatever the range.
fn admin_window(principal: &Principal, params: &AnalyticsParams) -> ApiResult<AnalyticsWindow> {
    require_admin(principal, "read analytics")?;
    Ok(params.validate()?)
}

/// GET /analytics/messages
#[utoipa::path(
    get,
    path = "/analytics/messages",
    tag = "Analytics",
    params(("timeRange" = Option<String>, Query, description = "1d, 7d, 30d or 90d (default 7d)")),
    responses(
        (status = 200, description = "Message activity report", body = MessageReport),
        (status = 400, description = "Invalid time range", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
pub async fn message_report(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<Response> {
    let window = admin_window(&principal, &params)?;
    let report = query.analytics.messages(&principal, window).await?;
    Ok(cached_response(report.from_cache(), report.into_value()))
}

/// GET /analytics/files
#[utoipa::path(
    get,
    path = "/analytics/files",
    tag = "Analytics",
    params(("timeRange" = Option<String>, Query, description = "1d, 7d, 30d or 90d (default 7d)")),
    responses(
        (status = 200, description = "Attachment report", body = FileReport),
        (status = 400, description = "Invalid time range", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
pub async fn file_report(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<Response> {
    let window = admin_window(&principal, &params)?;
    let report = query.analytics.files(&principal, window).await?;
    Ok(cached_response(report.from_cache(), report.into_value()))
}

/// GET /analytics/users
#[utoipa::path(
    get,
    path = "/analytics/users",
    tag = "Analytics",
    params(("timeRange" = Option<String>, Query, description = "1d, 7d, 30d or 90d (default 7d)")),
    responses(
        (status = 200, description = "User growth report", body = UserReport),
        (status = 400, description = "Invalid time range", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
pub async fn user_report(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<Response> {
    let window = admin_window(&principal, &params)?;
    let report = query.analytics.users(&principal, window).await?;
    Ok(cached_response(report.from_cache(), report.into_value()))
}

/// GET /analytics/notifications
#[utoipa::path(
    get,
    path = "/analytics/notifications",
    tag = "Analytics",
    params(("timeRange" = Option<String>, Query, description = "1d, 7d, 30d or 90d (default 7d)")),
    responses(
        (status = 200, description = "Notification delivery report", body = NotificationReport),
        (status = 400, description = "Invalid time range", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
pub async fn notification_report(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<Response> {
    let window = admin_window(&principal, &params)?;
    let report = query.analytics.notifications(&principal, window).await?;
    Ok(cached_response(report.from_cache(), report.into_value()))
}

/// GET /analytics/platform - All reports plus job status breakdown
#[utoipa::path(
    get,
    path = "/analytics/platform",
    tag = "Analytics",
    params(("timeRange" = Option<String>, Query, description = "1d, 7d, 30d or 90d (default 7d)")),
    responses(
        (status = 200, description = "Combined platform report", body = PlatformReport),
        (status = 400, description = "Invalid time range", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
pub async fn platform_report(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<Response> {
    let window = admin_window(&principal, &params)?;
    let report = query.analytics.platform(&principal, window).await?;
    Ok(cached_response(report.from_cache(), report.into_value()))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(message_report))
        .route("/files", get(file_report))
        .route("/users", get(user_report))
        .route("/notifications", get(notification_report))
        .route("/platform", get(platform_report))
}
