//! Search Routes
//!
//! `GET /search/{messages,conversations,users,suggestions}`. Admin-only
//! requests are rejected before their parameters are validated. Parameters
//! are validated in full before the engine is called, and the engine applies
//! the viewer scope.

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use gigbridge_core::{
    ConversationSearch, ConversationSearchParams, Message, MessageSearch, MessageSearchParams,
    PaginationMeta, SuggestionParams, User, UserSearch, UserSearchParams,
};
use gigbridge_query::{require_admin, Conversation, QueryLayer};
use serde::Serialize;

use super::cached_response;
use crate::{
    error::{ApiError, ApiResult},
    extractors::PrincipalExtractor,
    state::AppState,
};

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageSearchData {
    pub messages: Vec<Message>,
    pub pagination: PaginationMeta,
    /// The validated filter, echoed back.
    #[schema(value_type = Object)]
    pub filters: MessageSearch,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConversationSearchData {
    pub conversations: Vec<Conversation>,
    pub pagination: PaginationMeta,
    #[schema(value_type = Object)]
    pub filters: ConversationSearch,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserSearchData {
    pub users: Vec<User>,
    pub pagination: PaginationMeta,
    #[schema(value_type = Object)]
    pub filters: UserSearch,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SuggestionData {
    pub suggestions: Vec<String>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /search/messages - Messages in the caller's jobs
#[utoipa::path(
    get,
    path = "/search/messages",
    tag = "Search",
    params(
        ("query" = Option<String>, Query, description = "Case-insensitive text match"),
        ("jobId" = Option<String>, Query, description = "Restrict to one job"),
        ("messageType" = Option<String>, Query, description = "text, image or file"),
        ("hasAttachment" = Option<bool>, Query),
        ("dateFrom" = Option<String>, Query, description = "ISO-8601 date or timestamp"),
        ("dateTo" = Option<String>, Query, description = "ISO-8601 date or timestamp"),
        ("page" = Option<u32>, Query),
        ("limit" = Option<u32>, Query, description = "1 to 100"),
        ("sortBy" = Option<String>, Query, description = "createdAt, message or senderId"),
        ("sortOrder" = Option<String>, Query, description = "asc or desc"),
    ),
    responses(
        (status = 200, description = "One page of matching messages", body = MessageSearchData),
        (status = 400, description = "Invalid parameters", body = ApiError),
        (status = 401, description = "Missing principal", body = ApiError),
    ),
)]
pub async fn search_messages(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<MessageSearchParams>,
) -> ApiResult<Response> {
    let filter = params.validate()?;
    let result = query.search.messages(&principal, filter.clone()).await?;
    let from_cache = result.from_cache();
    let page = result.into_value();
    Ok(cached_response(
        from_cache,
        MessageSearchData {
            messages: page.items,
            pagination: page.pagination,
            filters: filter,
        },
    ))
}

/// GET /search/conversations - The caller's job conversations
#[utoipa::path(
    get,
    path = "/search/conversations",
    tag = "Search",
    params(
        ("query" = Option<String>, Query, description = "Matches job title or last message"),
        ("jobStatus" = Option<String>, Query),
        ("hasUnread" = Option<bool>, Query),
        ("dateFrom" = Option<String>, Query),
        ("dateTo" = Option<String>, Query),
        ("page" = Option<u32>, Query),
        ("limit" = Option<u32>, Query),
        ("sortBy" = Option<String>, Query, description = "lastMessageAt, messageCount or unreadCount"),
        ("sortOrder" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "One page of conversations", body = ConversationSearchData),
        (status = 400, description = "Invalid parameters", body = ApiError),
        (status = 401, description = "Missing principal", body = ApiError),
    ),
)]
pub async fn search_conversations(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<ConversationSearchParams>,
) -> ApiResult<Response> {
    let filter = params.validate()?;
    let result = query
        .search
        .conversations(&principal, filter.clone())
        .await?;
    let from_cache = result.from_cache();
    let page = result.into_value();
    Ok(cached_response(
        from_cache,
        ConversationSearchData {
            conversations: page.items,
            pagination: page.pagination,
            filters: filter,
        },
    ))
}

/// GET /search/users - User directory search (admin only)
#[utoipa::path(
    get,
    path = "/search/users",
    tag = "Search",
    params(
        ("query" = Option<String>, Query, description = "Matches phone, email or display name"),
        ("role" = Option<String>, Query),
        ("isVerified" = Option<bool>, Query),
        ("dateFrom" = Option<String>, Query),
        ("dateTo" = Option<String>, Query),
        ("page" = Option<u32>, Query),
        ("limit" = Option<u32>, Query),
        ("sortBy" = Option<String>, Query, description = "createdAt, phone or role"),
        ("sortOrder" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "One page of users", body = UserSearchData),
        (status = 400, description = "Invalid parameters", body = ApiError),
        (status = 401, description = "Missing principal", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
    ),
)]
pub async fn search_users(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<UserSearchParams>,
) -> ApiResult<Response> {
    require_admin(&principal, "search users")?;
    let filter = params.validate()?;
    let result = query.search.users(&principal, filter.clone()).await?;
    let from_cache = result.from_cache();
    let page = result.into_value();
    Ok(cached_response(
        from_cache,
        UserSearchData {
            users: page.items,
            pagination: page.pagination,
            filters: filter,
        },
    ))
}

/// GET /search/suggestions - Autocomplete
#[utoipa::path(
    get,
    path = "/search/suggestions",
    tag = "Search",
    params(
        ("query" = Option<String>, Query, description = "At least two characters"),
        ("type" = Option<String>, Query, description = "messages, jobs or users"),
    ),
    responses(
        (status = 200, description = "Up to five distinct suggestions", body = SuggestionData),
        (status = 400, description = "Invalid parameters", body = ApiError),
        (status = 403, description = "User suggestions require admin", body = ApiError),
    ),
)]
pub async fn suggestions(
    State(query): State<QueryLayer>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Query(params): Query<SuggestionParams>,
) -> ApiResult<Response> {
    if params.requests_users() {
        require_admin(&principal, "suggest users")?;
    }
    let request = params.validate()?;
    let result = query.search.suggestions(&principal, request).await?;
    Ok(cached_response(
        result.from_cache(),
        SuggestionData {
            suggestions: result.into_value(),
        },
    ))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(search_messages))
        .route("/conversations", get(search_conversations))
        .route("/users", get(search_users))
        .route("/suggestions", get(suggestions))
}
