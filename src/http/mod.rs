//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer stack)
//!     → middleware/pipeline.rs (exempt check, correlation, admission)
//!     → request.rs (tracking context, completion guard)
//!     → handler (monitoring endpoints, API routes)
//!     → response.rs (error envelope, rate-limit and correlation headers)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, RequestGuard, RequestId, RequestTracker, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
