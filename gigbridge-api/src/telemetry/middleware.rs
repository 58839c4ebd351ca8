//! Per-request span, access log line and HTTP metrics.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::metrics::METRICS;

fn is_id_segment(segment: &str) -> bool {
    !segment.is_empty()
        && (segment.bytes().all(|b| b.is_ascii_digit()) || Uuid::parse_str(segment).is_ok())
}

/// Route template for metric labels: id-like segments become `{id}`.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .map(|s| if is_id_segment(s) { "{id}" } else { s })
        .collect();
    segments.join("/")
}

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let route = normalize_path(&path);

    let span = tracing::info_span!("http_request", %method, %path, %route);
    let response = next.run(request).instrument(span).await;

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(method.as_str(), &route, status, elapsed.as_secs_f64());
    }

    let elapsed_ms = elapsed.as_millis() as u64;
    if response.status().is_server_error() {
        tracing::warn!(%method, %path, status, elapsed_ms, "Request failed");
    } else {
        tracing::info!(%method, %path, status, elapsed_ms, "Request served");
    }
    response
}
