//! In-memory cache backend with a tag index for prefix invalidation.
//!
//! Keys are colon-delimited (`scope:resource:id`). Each key is indexed under
//! every prefix that ends at a delimiter (`scope:`, `scope:resource:`), so
//! `invalidate("scope:resource:*")` touches only the matched keys. Prefixes
//! that stop mid-segment fall back to a full scan.
//!
//! A key is tagged and untagged only while its entry's shard lock is held,
//! so a racing `set` of the same key can never lose its tags.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::backend::{CacheBackend, CacheError, CachedValue, Pattern};

const DELIMITER: char = ':';

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Every delimiter-terminated prefix of `key`.
fn tags_of(key: &str) -> impl Iterator<Item = &str> {
    key.match_indices(DELIMITER).map(move |(i, _)| &key[..=i])
}

#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
    tags: DashMap<String, HashSet<String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn untag(&self, key: &str) {
        for tag in tags_of(key) {
            let now_empty = match self.tags.get_mut(tag) {
                Some(mut keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.tags.remove_if(tag, |_, keys| keys.is_empty());
            }
        }
    }

    fn remove_entry_if(&self, key: &str, pred: impl FnOnce(&CacheEntry) -> bool) -> bool {
        self.entries
            .remove_if(key, |key, entry| {
                let remove = pred(entry);
                if remove {
                    self.untag(key);
                }
                remove
            })
            .is_some()
    }

    fn remove_key(&self, key: &str) -> bool {
        self.remove_entry_if(key, |_| true)
    }

    fn remove_prefix(&self, prefix: &str) -> usize {
        if prefix.is_empty() {
            let count = self.entries.len();
            // Tags first: a key inserted after this point is either cleared
            // below or tagged after the clear.
            self.tags.clear();
            self.entries.clear();
            return count;
        }

        if prefix.ends_with(DELIMITER) {
            let keys = self.tags.remove(prefix).map(|(_, keys)| keys).unwrap_or_default();
            return keys.iter().filter(|key| self.remove_key(key)).count();
        }

        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        matched.iter().filter(|key| self.remove_key(key)).count()
    }

    /// Number of distinct tags in the index.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

impl CacheBackend for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<CachedValue>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }

        self.remove_entry_if(key, |entry| !entry.is_live(now));
        Ok(None)
    }

    fn set(&self, key: &str, value: CachedValue, ttl: Duration) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(CacheError::TtlOverflow(ttl))?;

        let _slot = self
            .entries
            .entry(key.to_string())
            .insert(CacheEntry { value, expires_at });
        for tag in tags_of(key) {
            self.tags
                .entry(tag.to_string())
                .or_default()
                .insert(key.to_string());
        }
        Ok(())
    }

    fn invalidate(&self, pattern: &str) -> Result<usize, CacheError> {
        match Pattern::parse(pattern)? {
            Pattern::Exact(key) => Ok(usize::from(self.remove_key(key))),
            Pattern::Prefix(prefix) => Ok(self.remove_prefix(prefix)),
        }
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| self.remove_entry_if(key, |entry| !entry.is_live(now)))
            .count()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn val(v: Value) -> CachedValue {
        Arc::new(v)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_set_get_and_expiry() {
        let cache = InMemoryCache::new();
        cache.set("k", val(json!("v")), Duration::from_secs(1)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(val(json!("v"))));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.is_empty(), "expired entry removed on read");
        assert_eq!(cache.tag_count(), 0);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = InMemoryCache::new();
        cache.set("k", val(json!(1)), MINUTE).unwrap();
        cache.set("k", val(json!(2)), MINUTE).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(val(json!(2))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_prefix_invalidation_leaves_other_keys() {
        let cache = InMemoryCache::new();
        for key in ["scope:a", "scope:b:1", "scope:b:2", "other:a", "scopex:a"] {
            cache.set(key, val(json!(key)), MINUTE).unwrap();
        }

        assert_eq!(cache.invalidate("scope:*").unwrap(), 3);
        assert_eq!(cache.get("scope:a").unwrap(), None);
        assert_eq!(cache.get("scope:b:2").unwrap(), None);
        assert!(cache.get("other:a").unwrap().is_some());
        assert!(cache.get("scopex:a").unwrap().is_some());
    }

    #[test]
    fn test_nested_tag_invalidation_cleans_parent_tags() {
        let cache = InMemoryCache::new();
        cache.set("devices:item:1", val(json!(1)), MINUTE).unwrap();
        cache.set("devices:list:all", val(json!([])), MINUTE).unwrap();

        assert_eq!(cache.invalidate("devices:item:*").unwrap(), 1);
        assert!(cache.get("devices:list:all").unwrap().is_some());

        // Only `devices:` and `devices:list:` remain indexed.
        assert_eq!(cache.tag_count(), 2);
        assert_eq!(cache.invalidate("devices:*").unwrap(), 1);
        assert_eq!(cache.tag_count(), 0);
    }

    #[test]
    fn test_mid_segment_prefix_falls_back_to_scan() {
        let cache = InMemoryCache::new();
        cache.set("devices:1", val(json!(1)), MINUTE).unwrap();
        cache.set("devs:1", val(json!(1)), MINUTE).unwrap();
        cache.set("alerts:1", val(json!(1)), MINUTE).unwrap();

        assert_eq!(cache.invalidate("dev*").unwrap(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_exact_and_wildcard_all() {
        let cache = InMemoryCache::new();
        cache.set("a:1", val(json!(1)), MINUTE).unwrap();
        cache.set("a:2", val(json!(2)), MINUTE).unwrap();

        assert_eq!(cache.invalidate("a:1").unwrap(), 1);
        assert_eq!(cache.invalidate("a:1").unwrap(), 0);
        assert_eq!(cache.invalidate("*").unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let cache = InMemoryCache::new();
        assert!(cache.invalidate("a*b").is_err());
        assert_eq!(cache.set("", val(json!(1)), MINUTE), Err(CacheError::EmptyKey));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = InMemoryCache::new();
        cache.set("short:1", val(json!(1)), Duration::from_secs(1)).unwrap();
        cache.set("long:1", val(json!(1)), MINUTE).unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.tag_count(), 1);
    }

    #[test]
    fn test_unrepresentable_ttl_is_an_error() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(u64::MAX);
        assert_eq!(
            cache.set("a:1", val(json!(1)), ttl),
            Err(CacheError::TtlOverflow(ttl))
        );
        assert!(cache.is_empty());
        assert_eq!(cache.tag_count(), 0);
    }

    #[test]
    fn test_expired_read_racing_set_keeps_new_entry_invalidatable() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..2000 {
            let cache = Arc::new(InMemoryCache::new());
            cache.set("s:k", val(json!("old")), Duration::ZERO).unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let reader = {
                let (cache, barrier) = (cache.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    cache.get("s:k").unwrap();
                })
            };
            let writer = {
                let (cache, barrier) = (cache.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    cache.set("s:k", val(json!("new")), MINUTE).unwrap();
                })
            };
            reader.join().unwrap();
            writer.join().unwrap();

            cache.invalidate("s:*").unwrap();
            assert_eq!(cache.get("s:k").unwrap(), None, "live entry escaped invalidation");
        }
    }
}
