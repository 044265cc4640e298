//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the traffic layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Response cache configuration.
    pub cache: CacheConfig,

    /// Request tracking configuration.
    pub tracking: TrackingConfig,

    /// Metrics monitor capacities.
    pub monitor: MonitorConfig,

    /// Path prefixes that bypass rate limiting and tracking.
    pub exempt_paths: ExemptPaths,

    /// Error rendering.
    pub errors: ErrorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total handler time) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// How rate-limit windows are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    /// One window per (client, path).
    #[default]
    ClientAndPath,
    /// One window per client across all paths.
    Client,
}

impl KeyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyScope::ClientAndPath => "client_and_path",
            KeyScope::Client => "client",
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests admitted per window.
    pub max_requests: u32,

    /// Sliding window length in seconds.
    pub window_seconds: u64,

    /// Window keying.
    pub key_scope: KeyScope,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_seconds: 60,
            key_scope: KeyScope::ClientAndPath,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the in-memory backend. When false a no-op backend is installed.
    pub enabled: bool,

    /// TTL used by routes that do not pass their own.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
        }
    }
}

/// Request tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Maximum number of request contexts retained.
    pub context_capacity: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            context_capacity: 1000,
        }
    }
}

/// Metrics monitor capacities.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Recent samples kept per endpoint.
    pub endpoint_ring_size: usize,

    /// Recent requests kept across all endpoints.
    pub recent_events_capacity: usize,

    /// Recent failed requests kept across all endpoints.
    pub recent_errors_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint_ring_size: 100,
            recent_events_capacity: 1000,
            recent_errors_capacity: 500,
        }
    }
}

/// Path prefixes exempt from rate limiting and tracking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ExemptPaths(pub Vec<String>);

impl Default for ExemptPaths {
    fn default() -> Self {
        Self(vec![
            "/health".to_string(),
            "/docs".to_string(),
            "/metrics".to_string(),
        ])
    }
}

impl ExemptPaths {
    /// A path is exempt if it equals an entry or sits below it. A trailing
    /// slash on an entry is ignored, so `"/"` exempts everything.
    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|entry| {
            let prefix = entry.trim_end_matches('/');
            prefix.is_empty()
                || path == prefix
                || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
        })
    }
}

/// Error rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ErrorConfig {
    /// Include internal fault details in error bodies.
    pub debug: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,

    /// Interval between janitor sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            sweep_interval_secs: 60,
        }
    }
}
