//! REST API Routes
//!
//! Router assembly for the GigBridge HTTP surface. Search, analytics and
//! entity routes sit behind the rate limiter; health, metrics and the
//! OpenAPI document do not.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::extractors::{USER_ID_HEADER, USER_ROLE_HEADER};
use crate::middleware::rate_limit_middleware;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod analytics;
pub mod health;
pub mod marketplace;
pub mod search;

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// `{ "success": true, "data": ... }` wrapper for successful responses.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Wrap `data` in the envelope and tag the response with whether it was
/// served from the cache.
pub fn cached_response<T: Serialize>(from_cache: bool, data: T) -> Response {
    let mut response = Json(Envelope::ok(data)).into_response();
    response.headers_mut().insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(if from_cache { "hit" } else { "miss" }),
    );
    response
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete router over `state`.
///
/// Layer order, outermost first: CORS, request tracing, observability,
/// then the rate limiter on the rate-limited routes.
pub fn create_api_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let limited = Router::new()
        .nest("/search", search::create_router())
        .nest("/analytics", analytics::create_router())
        .merge(marketplace::create_router())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(limited);

    #[cfg(feature = "swagger-ui")]
    {
        use utoipa_swagger_ui::SwaggerUi;
        router = router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/swagger-ui.json", ApiDoc::openapi()),
        );
    }

    router
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// CORS LAYER
// ============================================================================

const EXPOSED_HEADERS: [&str; 4] = [
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "retry-after",
    CACHE_STATUS_HEADER,
];

/// Any origin while none are configured; otherwise only the configured ones,
/// with `*.domain` entries matched per request.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
        ])
        .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static))
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS open to every origin");
        return base.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS restricted");
    let allowed = config.clone();
    let cors = base.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin.to_str().is_ok_and(|o| allowed.is_origin_allowed(o))
    }));
    cors.allow_credentials(config.cors_allow_credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(Envelope::ok(vec!["plumbing"]))?;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0], "plumbing");
        Ok(())
    }

    #[test]
    fn test_cached_response_header() {
        let hit = cached_response(true, 1);
        assert_eq!(hit.headers()[CACHE_STATUS_HEADER], "hit");
        let miss = cached_response(false, 1);
        assert_eq!(miss.headers()[CACHE_STATUS_HEADER], "miss");
    }
}
