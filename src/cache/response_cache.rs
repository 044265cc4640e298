//! Fail-open cache facade used by route handlers.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::backend::{CacheBackend, CachedValue, NoopCache};
use super::memory::InMemoryCache;
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Counters exposed on the monitoring endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub evicted: u64,
    pub errors: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    evicted: AtomicU64,
    errors: AtomicU64,
}

/// Response cache shared by all routes.
///
/// Backend failures never reach the caller: reads degrade to misses and
/// writes or invalidations are logged and dropped. Nothing here watches the
/// underlying data, so every mutating route must call [`invalidate`] itself.
///
/// [`invalidate`]: ResponseCache::invalidate
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    counters: Arc<Counters>,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        tracing::debug!(backend = backend.name(), "Response cache created");
        Self {
            backend,
            default_ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Pick the backend from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.default_ttl_secs);
        if config.enabled {
            Self::new(Arc::new(InMemoryCache::new()), ttl)
        } else {
            Self::new(Arc::new(NoopCache), ttl)
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn get(&self, key: &str) -> Option<CachedValue> {
        match self.backend.get(key) {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("hit");
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("miss");
                None
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Typed read. A stored value that no longer decodes counts as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match T::deserialize(value.as_ref()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        match self.backend.set(key, Arc::new(value), ttl) {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("set");
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Cache write failed");
            }
        }
    }

    /// Typed write. `None` uses the configured default TTL.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json, ttl.unwrap_or(self.default_ttl)),
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Value not cacheable");
            }
        }
    }

    /// Remove every key matching `pattern` (`"scope:resource:*"` or an exact
    /// key). Best effort.
    pub fn invalidate(&self, pattern: &str) {
        match self.backend.invalidate(pattern) {
            Ok(removed) => {
                self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                self.counters.evicted.fetch_add(removed as u64, Ordering::Relaxed);
                metrics::record_cache_event("invalidate");
                tracing::debug!(pattern, removed, "Cache invalidated");
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pattern, error = %e, "Cache invalidation failed");
            }
        }
    }

    /// Read-through helper: return the cached value for `key`, or run `load`,
    /// cache its success for `ttl` and return it. Errors are never cached.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_json(key) {
            return Ok(hit);
        }
        let value = load().await?;
        self.set_json(key, &value, ttl);
        Ok(value)
    }

    /// Drop expired entries. Called by the janitor.
    pub fn purge_expired(&self) -> usize {
        self.backend.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            entries: self.backend.len(),
        }
    }
}
