use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::config::KeyScope;
use crate::errors::{ApiError, ApiResult};
use crate::http::request::RequestContext;
use crate::http::server::AppState;
use crate::observability::{EndpointStats, MonitorSummary, RequestSummary, StatusDistribution};

/// Hard cap on list sizes returned by the monitoring endpoints.
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

impl LimitParams {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub tracked_requests: usize,
    pub active_requests: usize,
}

#[derive(Serialize)]
pub struct RouteDoc {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

#[derive(Serialize)]
pub struct RateLimitView {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
    pub key_scope: KeyScope,
    pub tracked_clients: usize,
}

#[derive(Serialize)]
pub struct CacheView {
    pub backend: &'static str,
    pub default_ttl_secs: u64,
    #[serde(flatten)]
    pub stats: CacheStats,
}

const ROUTES: &[RouteDoc] = &[
    RouteDoc { method: "GET", path: "/health", description: "Liveness and basic counters" },
    RouteDoc { method: "GET", path: "/docs", description: "This route listing" },
    RouteDoc { method: "GET", path: "/metrics/summary", description: "Aggregate request metrics" },
    RouteDoc { method: "GET", path: "/metrics/endpoints", description: "Per-endpoint statistics" },
    RouteDoc { method: "GET", path: "/metrics/slow", description: "Slowest endpoints by average latency" },
    RouteDoc { method: "GET", path: "/metrics/errors", description: "Endpoints with the highest error rate" },
    RouteDoc { method: "GET", path: "/metrics/recent", description: "Most recent requests" },
    RouteDoc { method: "GET", path: "/metrics/recent-errors", description: "Most recent failed requests" },
    RouteDoc { method: "GET", path: "/metrics/status-codes", description: "Status code distribution" },
    RouteDoc { method: "GET", path: "/metrics/cache", description: "Response cache statistics" },
    RouteDoc { method: "GET", path: "/metrics/rate-limit", description: "Rate limiter settings and load" },
    RouteDoc { method: "GET", path: "/metrics/requests/{id}", description: "Tracked request context" },
    RouteDoc { method: "POST", path: "/metrics/reset", description: "Clear all recorded metrics" },
    RouteDoc { method: "GET", path: "/api/devices", description: "List devices (cached)" },
    RouteDoc { method: "POST", path: "/api/devices", description: "Register a device" },
    RouteDoc { method: "GET", path: "/api/devices/{id}", description: "Fetch a device (cached)" },
    RouteDoc { method: "PUT", path: "/api/devices/{id}", description: "Update a device" },
    RouteDoc { method: "DELETE", path: "/api/devices/{id}", description: "Remove a device" },
];

pub async fn get_health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.monitor.uptime().as_secs(),
        tracked_requests: state.tracker.len(),
        active_requests: state.tracker.active_count(),
    })
}

pub async fn get_docs() -> Json<&'static [RouteDoc]> {
    Json(ROUTES)
}

pub async fn get_summary(State(state): State<AppState>) -> Json<MonitorSummary> {
    Json(state.monitor.get_summary())
}

pub async fn get_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointStats>> {
    Json(state.monitor.get_all_metrics())
}

pub async fn get_slow(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<EndpointStats>> {
    Json(state.monitor.get_slow_endpoints(params.resolve(10)))
}

pub async fn get_errors(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<EndpointStats>> {
    Json(state.monitor.get_error_endpoints(params.resolve(10)))
}

pub async fn get_recent(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<RequestSummary>> {
    Json(state.monitor.get_recent_requests(params.resolve(50)))
}

pub async fn get_recent_errors(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<RequestSummary>> {
    Json(state.monitor.get_recent_errors(params.resolve(50)))
}

pub async fn get_status_codes(State(state): State<AppState>) -> Json<StatusDistribution> {
    Json(state.monitor.get_status_code_distribution())
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheView> {
    Json(CacheView {
        backend: state.cache.backend_name(),
        default_ttl_secs: state.cache.default_ttl().as_secs(),
        stats: state.cache.stats(),
    })
}

pub async fn get_rate_limit(State(state): State<AppState>) -> Json<RateLimitView> {
    let settings = state.limiter.settings();
    Json(RateLimitView {
        enabled: settings.enabled,
        max_requests: settings.max_requests,
        window_seconds: settings.window_seconds,
        key_scope: settings.key_scope,
        tracked_clients: state.limiter.tracked_clients(),
    })
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RequestContext>> {
    state
        .tracker
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Request {}", id)))
}

pub async fn reset_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.monitor.reset();
    Json(serde_json::json!({ "status": "reset" }))
}
