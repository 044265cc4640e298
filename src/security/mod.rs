//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (resolve client identity, sliding-window admission)
//!     → Pass to handler, or reject with 429
//! ```
//!
//! # Design Decisions
//! - Per-key entry lock makes check-and-record atomic per client
//! - Settings are hot-swappable without dropping live windows

pub mod rate_limit;

pub use rate_limit::{client_identity, RateLimitExceeded, RateLimitStatus, RateLimiter};
