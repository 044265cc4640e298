//! Periodic housekeeping.
//!
//! # Responsibilities
//! - Drop rate-limit windows of idle clients
//! - Purge expired cache entries that were never read again

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::cache::ResponseCache;
use crate::security::rate_limit::RateLimiter;

pub struct Janitor {
    limiter: Arc<RateLimiter>,
    cache: ResponseCache,
    interval: Duration,
}

impl Janitor {
    pub fn new(limiter: Arc<RateLimiter>, cache: ResponseCache, interval: Duration) -> Self {
        Self {
            limiter,
            cache,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// One sweep. Returns (windows dropped, cache entries purged).
    pub fn sweep(&self) -> (usize, usize) {
        let windows = self.limiter.sweep();
        let entries = self.cache.purge_expired();
        if windows > 0 || entries > 0 {
            tracing::debug!(windows, entries, "Janitor sweep");
        }
        (windows, entries)
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Janitor starting");

        let mut ticker = time::interval(self.interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Janitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, RateLimitConfig};
    use serde_json::json;

    fn janitor(interval: Duration) -> Janitor {
        Janitor::new(
            Arc::new(RateLimiter::new(RateLimitConfig {
                window_seconds: 10,
                ..RateLimitConfig::default()
            })),
            ResponseCache::from_config(&CacheConfig::default()),
            interval,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_reclaims_idle_state() {
        let janitor = janitor(Duration::from_secs(60));
        janitor.limiter.check("c1", "/a").unwrap();
        janitor
            .cache
            .set("devices:item:1", json!({"id": 1}), Duration::from_secs(5));

        assert_eq!(janitor.sweep(), (0, 0));

        time::advance(Duration::from_secs(11)).await;
        assert_eq!(janitor.sweep(), (1, 1));
        assert_eq!(janitor.limiter.tracked_clients(), 0);
        assert_eq!(janitor.cache.stats().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(janitor(Duration::from_secs(1)).run(rx));

        time::advance(Duration::from_secs(3)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
