//! Metrics exposition.
//!
//! # Responsibilities
//! - Mirror request, rate-limit and cache events into the `metrics` facade
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `api_requests_total` (counter): completed requests by method, path, status
//! - `api_request_duration_seconds` (histogram): latency distribution
//! - `api_rate_limited_total` (counter): rejected admissions by key scope
//! - `api_cache_events_total` (counter): hits, misses, sets, invalidations
//! - `api_tracked_requests` (gauge): request contexts currently retained
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - The in-process monitor stays the source of truth for the JSON endpoints

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    ::metrics::counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "api_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_rate_limited(scope: &'static str) {
    ::metrics::counter!("api_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    ::metrics::counter!("api_cache_events_total", "event" => event).increment(1);
}

pub fn record_tracked_requests(count: usize) {
    ::metrics::gauge!("api_tracked_requests").set(count as f64);
}
