//! Entity Routes
//!
//! Cached reads of users and jobs plus the one write the HTTP surface
//! carries, marking a conversation read. Reads go through the cache-aside
//! policy; the write evicts what it makes stale.

use axum::{
    extract::{Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use gigbridge_core::{
    Job, JobId, JobListParams, JobListing, PaginationMeta, Principal, User, UserId,
};
use gigbridge_query::QueryLayer;
use gigbridge_storage::{Cached, InvalidationReport, JobQuery, JobSort};
use serde::Serialize;

use super::{cached_response, Envelope};
use crate::{
    error::{ApiError, ApiResult},
    extractors::{PathId, PrincipalExtractor},
    state::AppState,
};

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListData {
    pub jobs: Vec<Job>,
    pub pagination: PaginationMeta,
    #[schema(value_type = Object)]
    pub filters: JobListing,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadData {
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    /// What the write evicted from the cache.
    #[schema(value_type = Object)]
    pub invalidation: InvalidationReport,
}

/// Store predicates for a listing. Non-admins only ever see jobs they take
/// part in.
fn job_query(principal: &Principal, listing: &JobListing) -> JobQuery {
    JobQuery {
        participant: (!principal.is_admin()).then_some(principal.user_id),
        client_id: listing.client_id,
        freelancer_id: listing.freelancer_id,
        status: listing.status,
        text: listing.query.clone(),
        created: listing.date_range,
    }
}

/// A job the caller may see, or a 404 that does not reveal whether it exists.
async fn visible_job(
    query: &QueryLayer,
    principal: &Principal,
    id: JobId,
) -> ApiResult<Cached<Job>> {
    let result = query.marketplace.job(id).await?;
    let from_cache = result.from_cache();
    match result.into_value() {
        Some(job) if principal.is_admin() || job.is_participant(principal.user_id) => {
            Ok(if from_cache {
                Cached::hit(job)
            } else {
                Cached::computed(job)
            })
        }
        _ => Err(ApiError::entity_not_found("Job", id)),
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /users/{id} - A user profile (self or admin)
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User profile", body = User),
        (status = 403, description = "Not the caller's profile", body = ApiError),
        (status = 404, description = "Unknown user", body = ApiError),
    ),
)]
pub async fn get_user(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    PathId(user_id): PathId<UserId>,
) -> ApiResult<Response> {
    if !principal.is_admin() && principal.user_id != user_id {
        return Err(ApiError::forbidden("Users may only read their own profile"));
    }
    let result = query.marketplace.user(user_id).await?;
    let from_cache = result.from_cache();
    let user = result
        .into_value()
        .ok_or_else(|| ApiError::entity_not_found("User", user_id))?;
    Ok(cached_response(from_cache, user))
}

/// GET /jobs - Jobs the caller takes part in (all jobs for admins)
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    params(
        ("query" = Option<String>, Query, description = "Matches the job title"),
        ("status" = Option<String>, Query),
        ("clientId" = Option<String>, Query),
        ("freelancerId" = Option<String>, Query),
        ("dateFrom" = Option<String>, Query),
        ("dateTo" = Option<String>, Query),
        ("page" = Option<u32>, Query),
        ("limit" = Option<u32>, Query),
        ("sortBy" = Option<String>, Query, description = "createdAt, updatedAt or title"),
        ("sortOrder" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "One page of jobs", body = JobListData),
        (status = 400, description = "Invalid parameters", body = ApiError),
    ),
)]
pub async fn list_jobs(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<JobListParams>,
) -> ApiResult<Response> {
    let listing = params.validate()?;
    let result = query
        .marketplace
        .jobs(
            job_query(&principal, &listing),
            JobSort::new(listing.sort_by, listing.sort_order),
            listing.pagination,
        )
        .await?;
    let from_cache = result.from_cache();
    let page = result.into_value();
    Ok(cached_response(
        from_cache,
        JobListData {
            jobs: page.items,
            pagination: page.pagination,
            filters: listing,
        },
    ))
}

/// GET /jobs/{id}
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "The job", body = Job),
        (status = 404, description = "Unknown job or not a participant", body = ApiError),
    ),
)]
pub async fn get_job(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    PathId(job_id): PathId<JobId>,
) -> ApiResult<Response> {
    let job = visible_job(&query, &principal, job_id).await?;
    Ok(cached_response(job.from_cache(), job.into_value()))
}

/// POST /jobs/{id}/mark-read - Mark the caller's messages in a job as read
#[utoipa::path(
    post,
    path = "/jobs/{id}/mark-read",
    tag = "Jobs",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Messages marked read and caches evicted", body = MarkReadData),
        (status = 404, description = "Unknown job or not a participant", body = ApiError),
    ),
)]
pub async fn mark_read(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    PathId(job_id): PathId<JobId>,
) -> ApiResult<Json<Envelope<MarkReadData>>> {
    visible_job(&query, &principal, job_id).await?;
    let invalidation = query
        .marketplace
        .mark_read(job_id, principal.user_id)
        .await?;
    Ok(Json(Envelope::ok(MarkReadData {
        job_id,
        invalidation,
    })))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(get_user))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/mark-read", post(mark_read))
}
