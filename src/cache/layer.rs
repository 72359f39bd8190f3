//! Cache coherency layer.
//!
//! Read-through lookups with write-path invalidation over a
//! [`CacheBackend`]. Policy, in order of precedence:
//!
//! - loader errors propagate; cache errors never do
//! - a write that touches rows behind a key deletes that key before the
//!   write is acknowledged to its caller
//! - with the backend down, reads fall through to the loader and
//!   invalidation reports `false` without erroring
//!
//! There is no lock around read-then-populate: a populate racing a
//! concurrent write's invalidation can leave one stale entry until its TTL
//! expires. Entities that cannot tolerate that window should shorten their
//! TTL in the key taxonomy.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::keys::{CacheKey, KeyPattern};

#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Serve `key` from cache, falling through to `loader` on miss, decode
    /// failure, or backend trouble. The fresh value is written back only
    /// when the backend is currently available; population failures are
    /// logged and swallowed.
    pub async fn get_or_load<T, F, Fut, E>(&self, key: CacheKey, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let rendered = key.render();

        if self.backend.is_available() {
            match self.backend.get(&rendered).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                    Ok(value) => {
                        counter!("rondo_cache_hit_total").increment(1);
                        debug!(target = "cache::layer", key = %rendered, "cache hit");
                        return Ok(value);
                    }
                    Err(err) => {
                        warn!(
                            target = "cache::layer",
                            key = %rendered,
                            error = %err,
                            "cache entry undecodable, reloading"
                        );
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target = "cache::layer",
                        key = %rendered,
                        error = %err,
                        "cache read failed, falling through to loader"
                    );
                }
            }
        }

        counter!("rondo_cache_miss_total").increment(1);
        let value = loader().await?;

        if self.backend.is_available() {
            match serde_json::to_vec(&value) {
                Ok(bytes) => {
                    if let Err(err) = self.backend.set(&rendered, &bytes, key.ttl()).await {
                        warn!(
                            target = "cache::layer",
                            key = %rendered,
                            error = %err,
                            "cache population failed"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        target = "cache::layer",
                        key = %rendered,
                        error = %err,
                        "cache value unserializable, skipping population"
                    );
                }
            }
        }

        Ok(value)
    }

    /// Delete the given keys. Absent keys count as deleted. Returns whether
    /// the backend accepted every deletion; `false` means the backend is
    /// degraded, never that the caller's write failed.
    pub async fn invalidate(&self, keys: &[CacheKey]) -> bool {
        let mut accepted = true;
        for key in keys {
            let rendered = key.render();
            match self.backend.delete(&rendered).await {
                Ok(_) => {
                    counter!("rondo_cache_invalidation_total").increment(1);
                }
                Err(err) => {
                    warn!(
                        target = "cache::layer",
                        key = %rendered,
                        error = %err,
                        "cache invalidation failed"
                    );
                    accepted = false;
                }
            }
        }
        accepted
    }

    /// Delete every key in a namespace, for writes whose derived key set is
    /// unbounded. Same degradation contract as [`CacheLayer::invalidate`].
    pub async fn invalidate_pattern(&self, pattern: KeyPattern) -> bool {
        match self.backend.delete_pattern(pattern.render()).await {
            Ok(count) => {
                counter!("rondo_cache_invalidation_total").increment(count);
                true
            }
            Err(err) => {
                warn!(
                    target = "cache::layer",
                    pattern = pattern.render(),
                    error = %err,
                    "cache pattern invalidation failed"
                );
                false
            }
        }
    }
}
