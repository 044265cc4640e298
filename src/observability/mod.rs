//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! RequestTracker::end
//!     → monitor.rs (per-endpoint counters, recent rings)
//!     → metrics.rs (Prometheus mirror)
//!
//! Every component:
//!     → logging.rs (structured log events)
//!     → tracing.rs (request span with correlation id and trace headers)
//!
//! Consumers:
//!     → /metrics/* JSON endpoints (monitor reads)
//!     → Prometheus scrape (optional)
//! ```
//!
//! # Design Decisions
//! - Recording is fail-open: telemetry never breaks a response
//! - Request ID flows through spans, logs, metrics and error bodies
//! - Monitor is an explicit struct injected via AppState, not a global

pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod tracing;

pub use monitor::{
    EndpointKey, EndpointStats, MetricsMonitor, MonitorSummary, RequestSample, RequestSummary,
    StatusDistribution,
};
