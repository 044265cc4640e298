//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → components built from it at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps rate-limit settings and exempt paths
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only limiter settings and exempt paths are hot-reloadable; capacities
//!   need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AppConfig, CacheConfig, ErrorConfig, ExemptPaths, KeyScope, ListenerConfig, LogFormat,
    MonitorConfig, ObservabilityConfig, RateLimitConfig, TimeoutConfig, TrackingConfig,
};
