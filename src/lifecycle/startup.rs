//! Startup configuration resolution.
//!
//! # Design Decisions
//! - Fail fast: an unreadable or invalid config file is fatal
//! - No file means defaults, so the binary runs with zero setup
//! - Command-line overrides are applied after the file and re-validated

use std::path::Path;

use crate::config::loader::{load_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::AppConfig;

/// Resolve the startup configuration from an optional file and an optional
/// bind address override.
pub fn resolve_config(path: Option<&Path>, bind: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    if let Some(bind) = bind {
        config.listener.bind_address = bind.to_string();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve_config(None, None).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_bind_override_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener]\nbind_address = \"127.0.0.1:9000\"").unwrap();

        let config = resolve_config(Some(file.path()), Some("127.0.0.1:9100")).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9100");
    }

    #[test]
    fn test_bad_bind_override_rejected() {
        let err = resolve_config(None, Some("not-an-address")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
