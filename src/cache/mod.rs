//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! GET handler
//!     → ResponseCache::get(key)        hit → respond
//!     → miss: load from store → ResponseCache::set(key, value, ttl)
//!
//! Mutating handler
//!     → write to store
//!     → ResponseCache::invalidate("scope:resource:*")
//! ```
//!
//! # Design Decisions
//! - Lazy expiry: reads never return an expired entry; the janitor only
//!   reclaims memory
//! - Invalidation is the writer's responsibility; nothing auto-invalidates
//! - Backend is a strategy (in-memory or no-op) chosen from config
//! - Fail-open: cache faults degrade to misses, never to user errors

pub mod backend;
pub mod memory;
pub mod response_cache;

pub use backend::{CacheBackend, CacheError, CachedValue, NoopCache};
pub use memory::InMemoryCache;
pub use response_cache::{CacheStats, ResponseCache};
