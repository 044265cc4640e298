//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level and output format
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

fn default_directives(level: &str) -> String {
    format!("api_traffic={level},tower_http={level}")
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let directives = default_directives("debug");
        assert_eq!(directives, "api_traffic=debug,tower_http=debug");
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
