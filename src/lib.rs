//! API traffic control and observability layer.
//!
//! Rate limiting, response caching, request correlation, metrics and a
//! uniform error envelope, wired into an Axum router as one middleware
//! pipeline.

pub mod admin;
pub mod cache;
pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routes;
pub mod security;

pub use config::AppConfig;
pub use errors::{ApiError, ApiResult, ErrorCode};
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
