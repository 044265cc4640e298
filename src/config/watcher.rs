//! Configuration file watcher for hot reload.
//!
//! Only rate-limit settings and exempt paths are applied live. A change that
//! leaves both untouched is logged and not forwarded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{AppConfig, ExemptPaths, RateLimitConfig};

/// The part of the configuration that can change without a restart.
#[derive(Debug, Clone, PartialEq)]
struct Reloadable {
    rate_limit: RateLimitConfig,
    exempt_paths: ExemptPaths,
}

impl From<&AppConfig> for Reloadable {
    fn from(config: &AppConfig) -> Self {
        Self {
            rate_limit: config.rate_limit.clone(),
            exempt_paths: config.exempt_paths.clone(),
        }
    }
}

/// Outcome of re-reading the file.
#[derive(Debug)]
enum Reload {
    Changed(AppConfig),
    Unchanged,
}

fn reload(path: &Path, last: &mut Option<Reloadable>) -> Result<Reload, ConfigError> {
    let config = load_config(path)?;
    let current = Reloadable::from(&config);
    if last.as_ref() == Some(&current) {
        return Ok(Reload::Unchanged);
    }
    *last = Some(current);
    Ok(Reload::Changed(config))
}

/// Watches the configuration file and forwards validated updates.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let last = Arc::new(Mutex::new(
            load_config(&self.path).ok().map(|c| Reloadable::from(&c)),
        ));

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = ?e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                // Editors touch sibling swap files; only our file counts.
                if !event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
                {
                    return;
                }

                match reload(&path, &mut last.lock()) {
                    Ok(Reload::Changed(config)) => {
                        tracing::info!(
                            max_requests = config.rate_limit.max_requests,
                            window_seconds = config.rate_limit.window_seconds,
                            "Config file changed, applying"
                        );
                        let _ = tx.send(config);
                    }
                    Ok(Reload::Unchanged) => {
                        tracing::info!("Config file changed, nothing hot-reloadable differs")
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration")
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        // Watch the directory so atomic rename-on-save is still observed.
        let target = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(target, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
