//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, capacities > 0)
//! - Validate addresses and exempt path shapes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a socket address: {value}")]
    BadAddress { field: &'static str, value: String },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("exempt path {0:?} must start with '/'")]
    BadExemptPath(String),

    #[error("unknown log level {0:?}")]
    BadLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// One year.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positive: [(&'static str, u64); 8] = [
        ("rate_limit.max_requests", config.rate_limit.max_requests as u64),
        ("rate_limit.window_seconds", config.rate_limit.window_seconds),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("tracking.context_capacity", config.tracking.context_capacity as u64),
        ("monitor.endpoint_ring_size", config.monitor.endpoint_ring_size as u64),
        ("monitor.recent_events_capacity", config.monitor.recent_events_capacity as u64),
        ("monitor.recent_errors_capacity", config.monitor.recent_errors_capacity as u64),
        ("observability.sweep_interval_secs", config.observability.sweep_interval_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.cache.default_ttl_secs > MAX_CACHE_TTL_SECS {
        errors.push(ValidationError::TooLarge {
            field: "cache.default_ttl_secs",
            max: MAX_CACHE_TTL_SECS,
        });
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    for path in &config.exempt_paths.0 {
        if !path.starts_with('/') {
            errors.push(ValidationError::BadExemptPath(path.clone()));
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::BadLogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
