//! Sliding-window rate limiting.
//!
//! Every admitted request leaves a timestamp in its client's window. A check
//! first drops timestamps older than `window_seconds`, then admits only if
//! fewer than `max_requests` remain. The window map is sharded, and the whole
//! prune/compare/append step runs under the entry lock for that key, so two
//! concurrent requests can never both take the last slot.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::HeaderMap;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{KeyScope, RateLimitConfig};

/// Header carrying the original client address when behind a proxy.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Admission granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window.
    pub reset_in: Duration,
}

impl RateLimitStatus {
    /// `reset_in` rounded up to whole seconds.
    pub fn reset_secs(&self) -> u64 {
        ceil_secs(self.reset_in)
    }
}

/// Admission refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit of {limit} requests exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after: Duration,
    pub window: Duration,
}

impl RateLimitExceeded {
    /// Value for the `Retry-After` header: whole seconds, between 1 and the window.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after).clamp(1, self.window.as_secs().max(1))
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Per-client sliding-window limiter.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    settings: ArcSwap<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            settings: ArcSwap::from_pointee(config),
        }
    }

    /// Swap in new settings. Existing windows are kept and judged against
    /// the new limits on their next check.
    pub fn reconfigure(&self, config: RateLimitConfig) {
        tracing::info!(
            max_requests = config.max_requests,
            window_seconds = config.window_seconds,
            key_scope = ?config.key_scope,
            enabled = config.enabled,
            "Rate limiter reconfigured"
        );
        self.settings.store(Arc::new(config));
    }

    pub fn settings(&self) -> Arc<RateLimitConfig> {
        self.settings.load_full()
    }

    fn window_key(scope: KeyScope, client_id: &str, endpoint: &str) -> String {
        match scope {
            KeyScope::ClientAndPath => format!("{}|{}", client_id, endpoint),
            KeyScope::Client => client_id.to_string(),
        }
    }

    /// Check and, on success, consume one slot for `client_id` on `endpoint`.
    pub fn check(
        &self,
        client_id: &str,
        endpoint: &str,
    ) -> Result<RateLimitStatus, RateLimitExceeded> {
        let settings = self.settings.load();
        let limit = settings.max_requests;
        let window = Duration::from_secs(settings.window_seconds);

        if !settings.enabled {
            return Ok(RateLimitStatus {
                limit,
                remaining: limit,
                reset_in: Duration::ZERO,
            });
        }

        let key = Self::window_key(settings.key_scope, client_id, endpoint);
        let now = Instant::now();

        let mut entry = self.windows.entry(key).or_default();
        let timestamps = entry.value_mut();
        prune(timestamps, now, window);

        if timestamps.len() >= limit as usize {
            let oldest = timestamps.front().copied().unwrap_or(now);
            return Err(RateLimitExceeded {
                limit,
                retry_after: window.saturating_sub(now.duration_since(oldest)),
                window,
            });
        }

        timestamps.push_back(now);
        let oldest = timestamps.front().copied().unwrap_or(now);
        Ok(RateLimitStatus {
            limit,
            remaining: limit - timestamps.len() as u32,
            reset_in: window.saturating_sub(now.duration_since(oldest)),
        })
    }

    /// Drop windows that no longer hold any live timestamp. Equivalent to the
    /// lazy pruning done by `check`, just reclaiming memory for idle clients.
    pub fn sweep(&self) -> usize {
        let window = Duration::from_secs(self.settings.load().window_seconds);
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, now, window);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of client windows currently held.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// Resolve the client identity: first `X-Forwarded-For` entry, else the peer
/// address, else `"unknown"`.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(client), _) => client.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(max_requests: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_requests,
            window_seconds,
            key_scope: KeyScope::ClientAndPath,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down_then_rejects() {
        let limiter = limiter(3, 60);

        let remaining: Vec<u32> = (0..3)
            .map(|_| limiter.check("10.0.0.1", "/api/devices").unwrap().remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let err = limiter.check("10.0.0.1", "/api/devices").unwrap_err();
        assert_eq!(err.limit, 3);
        assert_eq!(err.retry_after_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_shrinks_as_window_slides() {
        let limiter = limiter(2, 60);
        limiter.check("c", "/p").unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.check("c", "/p").unwrap();

        let err = limiter.check("c", "/p").unwrap_err();
        assert_eq!(err.retry_after_secs(), 40);
        assert!(err.retry_after_secs() <= 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_after_expiry() {
        let limiter = limiter(2, 1);
        limiter.check("c", "/p").unwrap();
        limiter.check("c", "/p").unwrap();
        assert!(limiter.check("c", "/p").is_err());

        tokio::time::advance(Duration::from_millis(1100)).await;

        let status = limiter.check("c", "/p").unwrap();
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_consume_a_slot() {
        let limiter = limiter(1, 10);
        limiter.check("c", "/p").unwrap();
        for _ in 0..5 {
            assert!(limiter.check("c", "/p").is_err());
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("c", "/p").is_ok());
    }

    #[test]
    fn test_client_and_path_are_isolated() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("a", "/x").is_ok());
        assert!(limiter.check("a", "/y").is_ok());
        assert!(limiter.check("b", "/x").is_ok());
        assert!(limiter.check("a", "/x").is_err());
    }

    #[test]
    fn test_client_scope_shares_window_across_paths() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_requests: 1,
            window_seconds: 60,
            key_scope: KeyScope::Client,
        });
        assert!(limiter.check("a", "/x").is_ok());
        assert!(limiter.check("a", "/y").is_err());
    }

    #[test]
    fn test_disabled_admits_everything() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            max_requests: 1,
            ..RateLimitConfig::default()
        });
        for _ in 0..10 {
            assert_eq!(limiter.check("a", "/x").unwrap().remaining, 1);
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_reconfigure_applies_to_existing_windows() {
        let limiter = limiter(5, 60);
        limiter.check("a", "/x").unwrap();
        limiter.check("a", "/x").unwrap();

        limiter.reconfigure(RateLimitConfig {
            max_requests: 2,
            ..limiter.settings().as_ref().clone()
        });
        assert!(limiter.check("a", "/x").is_err());
    }

    #[test]
    fn test_concurrent_checks_never_double_admit() {
        let limiter = Arc::new(limiter(50, 60));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.check("same-client", "/hot").is_ok())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_idle_windows() {
        let limiter = limiter(5, 1);
        limiter.check("a", "/x").unwrap();
        limiter.check("b", "/x").unwrap();
        assert_eq!(limiter.sweep(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        limiter.check("b", "/x").unwrap();

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_client_identity_resolution() {
        let peer: SocketAddr = "192.168.1.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.7");

        let empty = HeaderMap::new();
        assert_eq!(client_identity(&empty, Some(peer)), "192.168.1.9");
        assert_eq!(client_identity(&empty, None), "unknown");
    }
}
