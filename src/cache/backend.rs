//! Cache capability interface.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Payload stored in the cache. Shared so hits do not deep-copy JSON.
pub type CachedValue = Arc<Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("invalid invalidation pattern {0:?}: '*' is only allowed as the final character")]
    InvalidPattern(String),

    #[error("cache key must not be empty")]
    EmptyKey,

    #[error("ttl of {0:?} overflows the clock")]
    TtlOverflow(Duration),
}

/// A storage strategy behind [`super::ResponseCache`].
///
/// Implementations must be safe to call from many requests at once.
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Live value for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<CachedValue>, CacheError>;

    /// Store `value`, replacing any previous entry, expiring after `ttl`.
    fn set(&self, key: &str, value: CachedValue, ttl: Duration) -> Result<(), CacheError>;

    /// Remove every key matched by `pattern`. A trailing `*` makes the rest a
    /// literal prefix; without it the pattern is an exact key. Returns the
    /// number of entries removed.
    fn invalidate(&self, pattern: &str) -> Result<usize, CacheError>;

    /// Drop entries whose expiry has passed. Returns how many were dropped.
    fn purge_expired(&self) -> usize;

    /// Entries currently held, including expired ones not yet purged.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parsed invalidation pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl<'a> Pattern<'a> {
    pub fn parse(pattern: &'a str) -> Result<Self, CacheError> {
        let (body, wildcard) = match pattern.strip_suffix('*') {
            Some(prefix) => (prefix, true),
            None => (pattern, false),
        };
        if body.contains('*') {
            return Err(CacheError::InvalidPattern(pattern.to_string()));
        }
        if wildcard {
            Ok(Pattern::Prefix(body))
        } else if body.is_empty() {
            Err(CacheError::EmptyKey)
        } else {
            Ok(Pattern::Exact(body))
        }
    }
}

/// Backend that stores nothing. Every read is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheBackend for NoopCache {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn get(&self, _key: &str) -> Result<Option<CachedValue>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: CachedValue, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn invalidate(&self, pattern: &str) -> Result<usize, CacheError> {
        Pattern::parse(pattern).map(|_| 0)
    }

    fn purge_expired(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(Pattern::parse("devices:*"), Ok(Pattern::Prefix("devices:")));
        assert_eq!(Pattern::parse("*"), Ok(Pattern::Prefix("")));
        assert_eq!(Pattern::parse("devices:item:7"), Ok(Pattern::Exact("devices:item:7")));
        assert!(matches!(Pattern::parse("dev*ices:*"), Err(CacheError::InvalidPattern(_))));
        assert_eq!(Pattern::parse(""), Err(CacheError::EmptyKey));
    }

    #[test]
    fn test_noop_never_hits() {
        let cache = NoopCache;
        cache
            .set("k", Arc::new(Value::from(1)), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.is_empty());
    }
}
