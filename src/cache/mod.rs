//! Rondo cache system.
//!
//! A read-through object cache over a pluggable key/value backend with TTL.
//! The backend is Redis in production and an in-process map for cache-less
//! deployments and tests. The cache is an optimization, never a correctness
//! dependency: every operation here degrades to the backing store when the
//! backend is unavailable.
//!
//! Key construction and invalidation triggers live in this module; callers
//! work with [`CacheKey`] / [`KeyPattern`] and never build key strings.

mod backend;
mod keys;
mod layer;

pub use backend::{CacheBackend, CacheError, MemoryBackend, RedisBackend};
pub use keys::{CacheKey, KeyPattern};
pub use layer::CacheLayer;
