//! Per-client rate limiting over the shared cache store.
//!
//! Each client IP gets a fixed window of `rate_limit_requests` requests.
//! Counters live in the cache store, so every instance behind the same
//! store enforces one budget. The limiter fails open when the store is down.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gigbridge_storage::RateDecision;
use std::net::{IpAddr, SocketAddr};

use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::{middleware::normalize_path, METRICS};

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the window resets
    pub retry_after: u64,
    pub limit: u32,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::rate_limited(self.retry_after).into_response();
        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from(self.retry_after),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from_static("0"),
        );
        response
    }
}

/// Client IP, preferring proxy headers over the peer address.
///
/// `None` when neither a proxy header nor a peer address is available.
pub fn extract_client_ip(request: &Request, peer: Option<SocketAddr>) -> Option<IpAddr> {
    // X-Forwarded-For can carry a chain; the first entry is the client
    if let Some(ip) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|first| first.trim().parse().ok())
    {
        return Some(ip);
    }

    if let Some(ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.trim().parse().ok())
    {
        return Some(ip);
    }

    peer.map(|addr| addr.ip())
}

/// Rate limiting middleware keyed by client IP.
///
/// Allowed responses carry `x-ratelimit-limit` and `x-ratelimit-remaining`;
/// limited requests get a 429 with `retry-after`.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let scope = match extract_client_ip(&request, connect_info.map(|ConnectInfo(addr)| addr)) {
        Some(ip) => format!("ip:{ip}"),
        None => "ip:unknown".to_string(),
    };

    let limit = state.rate_limiter.limit();
    match state.rate_limiter.check(&scope).await {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(limit),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(remaining),
            );
            Ok(response)
        }
        RateDecision::Limited { retry_after } => {
            tracing::warn!(scope = %scope, path = %request.uri().path(), "Rate limit exceeded");
            if let Ok(metrics) = METRICS.as_ref() {
                metrics.record_rate_limited(&normalize_path(request.uri().path()));
            }
            Err(RateLimitError {
                retry_after: retry_after.as_secs().max(1),
                limit,
            })
        }
    }
}
