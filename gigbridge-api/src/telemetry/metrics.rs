//! Prometheus registry for the service, scraped from `/metrics`.
//!
//! Request and store counters are updated inline. Cache-aside figures live
//! in the query layer and are copied into gauges at scrape time.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use gigbridge_query::QueryLayer;
use gigbridge_storage::CacheStats;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// Seconds, 1ms through 5s. Shared by request and store latencies.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Registered on first use; every recorder tolerates a failed registration.
pub static METRICS: Lazy<ApiResult<GigBridgeMetrics>> = Lazy::new(GigBridgeMetrics::new);

#[derive(Clone)]
pub struct GigBridgeMetrics {
    /// method, path, status
    pub http_requests_total: CounterVec,
    /// method, path
    pub http_request_seconds: HistogramVec,
    /// operation, entity, outcome
    pub store_operations_total: CounterVec,
    /// operation, entity
    pub store_operation_seconds: HistogramVec,
    /// outcome
    pub cache_events: GaugeVec,
    pub cache_hit_rate: Gauge,
    /// path
    pub rate_limited_total: CounterVec,
}

fn registered<T>(name: &str, result: prometheus::Result<T>) -> ApiResult<T> {
    result.map_err(|e| ApiError::internal_error(format!("Metric {name} not registered: {e}")))
}

impl GigBridgeMetrics {
    pub fn new() -> ApiResult<Self> {
        let buckets = LATENCY_BUCKETS.to_vec();
        Ok(Self {
            http_requests_total: registered(
                "http_requests_total",
                register_counter_vec!(
                    "gigbridge_http_requests_total",
                    "Requests served, by route template and status",
                    &["method", "path", "status"]
                ),
            )?,
            http_request_seconds: registered(
                "http_request_seconds",
                register_histogram_vec!(
                    "gigbridge_http_request_seconds",
                    "Request latency by route template",
                    &["method", "path"],
                    buckets.clone()
                ),
            )?,
            store_operations_total: registered(
                "store_operations_total",
                register_counter_vec!(
                    "gigbridge_store_operations_total",
                    "Persistent store calls by operation and outcome",
                    &["operation", "entity", "outcome"]
                ),
            )?,
            store_operation_seconds: registered(
                "store_operation_seconds",
                register_histogram_vec!(
                    "gigbridge_store_operation_seconds",
                    "Persistent store call latency",
                    &["operation", "entity"],
                    buckets
                ),
            )?,
            cache_events: registered(
                "cache_events",
                register_gauge_vec!(
                    "gigbridge_cache_events",
                    "Cache-aside outcomes since process start",
                    &["outcome"]
                ),
            )?,
            cache_hit_rate: registered(
                "cache_hit_rate",
                register_gauge!(
                    "gigbridge_cache_hit_rate",
                    "Share of cache-aside reads answered from the cache"
                ),
            )?,
            rate_limited_total: registered(
                "rate_limited_total",
                register_counter_vec!(
                    "gigbridge_rate_limited_total",
                    "Requests refused with 429",
                    &["path"]
                ),
            )?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, status.to_string().as_str()])
            .inc();
        self.http_request_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_db_operation(&self, operation: &str, entity: &str, ok: bool, duration_secs: f64) {
        let outcome = if ok { "ok" } else { "error" };
        self.store_operations_total
            .with_label_values(&[operation, entity, outcome])
            .inc();
        self.store_operation_seconds
            .with_label_values(&[operation, entity])
            .observe(duration_secs);
    }

    pub fn record_rate_limited(&self, path: &str) {
        self.rate_limited_total.with_label_values(&[path]).inc();
    }

    pub fn observe_cache(&self, stats: &CacheStats) {
        for (outcome, value) in [
            ("hit", stats.hits),
            ("miss", stats.misses),
            ("coalesced", stats.coalesced),
            ("unavailable", stats.unavailable),
            ("write_failure", stats.write_failures),
            ("decode_failure", stats.decode_failures),
            ("compute_failure", stats.compute_failures),
            ("timeout", stats.timeouts),
        ] {
            self.cache_events
                .with_label_values(&[outcome])
                .set(value as f64);
        }
        self.cache_hit_rate.set(stats.hit_rate());
    }
}

/// GET /metrics
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus text exposition", content_type = "text/plain"),
        (status = 500, description = "Encoding failed"),
    ),
)]
pub async fn metrics_handler(State(query): State<QueryLayer>) -> Response {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.observe_cache(&query.cache.stats());
    }

    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut body) {
        tracing::error!(error = %e, "Metrics encoding failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Result<&'static GigBridgeMetrics, String> {
        METRICS.as_ref().map_err(|e| e.message.clone())
    }

    #[test]
    fn test_store_failures_are_labelled() -> Result<(), String> {
        let metrics = metrics()?;
        metrics.record_db_operation("find", "message", true, 0.005);
        metrics.record_db_operation("aggregate", "users", false, 0.010);
        let failures = metrics
            .store_operations_total
            .with_label_values(&["aggregate", "users", "error"])
            .get();
        assert!(failures >= 1.0);
        Ok(())
    }

    #[test]
    fn test_observe_cache_sets_gauges() -> Result<(), String> {
        let metrics = metrics()?;
        metrics.observe_cache(&CacheStats {
            hits: 3,
            misses: 1,
            unavailable: 2,
            ..Default::default()
        });
        assert_eq!(metrics.cache_events.with_label_values(&["hit"]).get(), 3.0);
        assert_eq!(metrics.cache_events.with_label_values(&["unavailable"]).get(), 2.0);
        assert!((metrics.cache_hit_rate.get() - 0.75).abs() < 1e-9);
        Ok(())
    }
}
