//! Monitoring and documentation endpoints.
//!
//! Everything here sits under an exempt prefix by default (`/health`,
//! `/docs`, `/metrics`), so reading metrics neither counts toward a client's
//! rate limit nor shows up in the metrics themselves.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/docs", get(get_docs))
        .route("/metrics/summary", get(get_summary))
        .route("/metrics/endpoints", get(get_endpoints))
        .route("/metrics/slow", get(get_slow))
        .route("/metrics/errors", get(get_errors))
        .route("/metrics/recent", get(get_recent))
        .route("/metrics/recent-errors", get(get_recent_errors))
        .route("/metrics/status-codes", get(get_status_codes))
        .route("/metrics/cache", get(get_cache))
        .route("/metrics/rate-limit", get(get_rate_limit))
        .route("/metrics/requests/{id}", get(get_request))
        .route("/metrics/reset", post(reset_metrics))
        .with_state(state)
}
