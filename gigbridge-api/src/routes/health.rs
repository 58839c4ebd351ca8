//! Liveness and readiness probes. None of these need a principal and none
//! sit behind the rate limiter.
//!
//! Readiness pings the persistent store and the cache store concurrently.
//! Losing the cache only degrades the service, since reads fall through to
//! the store; losing the store makes it unready (503).

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// The store decides readiness; the cache can only degrade it.
    fn combine(store: Self, cache: Self) -> Self {
        use HealthStatus::*;
        match (store, cache) {
            (Healthy, Healthy) => Healthy,
            (Healthy, _) => Degraded,
            _ => Unhealthy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ReadinessDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ReadinessDetails {
    pub database: ProbeResult,
    pub cache: ProbeResult,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Outcome of pinging one backing service.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProbeResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    async fn run<E: Display>(ping: impl Future<Output = Result<(), E>>) -> Self {
        let started = Instant::now();
        let outcome = ping.await;
        let mut result = Self {
            status: HealthStatus::Healthy,
            backend: None,
            latency_ms: None,
            error: None,
        };
        match outcome {
            Ok(()) => result.latency_ms = Some(started.elapsed().as_millis() as u64),
            Err(e) => {
                result.status = HealthStatus::Unhealthy;
                result.error = Some(e.to_string());
            }
        }
        result
    }
}

#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses((status = 200, description = "Literal `pong`", body = String)),
)]
pub async fn ping() -> &'static str {
    "pong"
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is up", body = HealthResponse)),
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("alive".to_string()),
        details: None,
    })
}

/// GET /health/ready
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready, or degraded with the cache down", body = HealthResponse),
        (status = 503, description = "Persistent store unreachable", body = HealthResponse),
    ),
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let (database, mut cache) = tokio::join!(
        ProbeResult::run(state.store.ping()),
        ProbeResult::run(state.cache_store.ping()),
    );
    cache.backend = Some(state.cache_store.backend_name().to_string());

    let status = HealthStatus::combine(database.status, cache.status);
    if status != HealthStatus::Healthy {
        tracing::warn!(database = ?database.status, cache = ?cache.status, "Not fully ready");
    }

    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let body = HealthResponse {
        status,
        message: None,
        details: Some(ReadinessDetails {
            database,
            cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };
    (code, Json(body))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_response_is_status_only() -> Result<(), serde_json::Error> {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            message: None,
            details: None,
        };
        assert_eq!(serde_json::to_string(&response)?, r#"{"status":"degraded"}"#);
        Ok(())
    }

    #[test]
    fn test_cache_outage_only_degrades() {
        use HealthStatus::*;
        assert_eq!(HealthStatus::combine(Healthy, Healthy), Healthy);
        assert_eq!(HealthStatus::combine(Healthy, Unhealthy), Degraded);
        assert_eq!(HealthStatus::combine(Unhealthy, Healthy), Unhealthy);
    }

    #[tokio::test]
    async fn test_failed_probe_keeps_error_and_drops_latency() {
        let result = ProbeResult::run(async { Err::<(), _>("connection refused") }).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        assert!(result.latency_ms.is_none());
    }
}
