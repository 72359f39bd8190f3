//! Cache storage backends.
//!
//! [`RedisBackend`] is the production adapter; [`MemoryBackend`] serves
//! single-process deployments that run without Redis, and tests. Both sit
//! behind [`CacheBackend`], which the coherency layer consumes.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable")]
    Unavailable,
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache codec error: {0}")]
    Codec(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Key/value backend with TTL semantics.
///
/// `is_available` is advisory: operations may still fail after it returns
/// true, and the coherency layer treats any error as a miss or a skipped
/// write, never as a caller-visible failure.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key, returning whether it existed. Deleting an absent key
    /// is not an error.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key matching a glob pattern, returning the count.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    fn is_available(&self) -> bool;
}

// ============================================================================
// Redis backend
// ============================================================================

const SCAN_DELETE_CHUNK: usize = 500;

/// Redis adapter over a [`ConnectionManager`], which reconnects on its own;
/// the availability flag tracks the outcome of the most recent command so a
/// recovered server flips the backend back to available on first use.
pub struct RedisBackend {
    conn: Option<ConnectionManager>,
    available: AtomicBool,
}

impl RedisBackend {
    /// Connect with retry. A backend that never comes up is still returned,
    /// permanently unavailable, so the rest of the process can start.
    pub async fn connect(url: &str, attempts: u32, retry_delay: Duration) -> Self {
        for attempt in 1..=attempts.max(1) {
            match Self::try_connect(url).await {
                Ok(conn) => {
                    info!(target = "cache::backend", "redis cache initialized");
                    return Self {
                        conn: Some(conn),
                        available: AtomicBool::new(true),
                    };
                }
                Err(err) => {
                    warn!(
                        target = "cache::backend",
                        attempt,
                        attempts,
                        error = %err,
                        "redis connection attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }

        warn!(
            target = "cache::backend",
            "redis cache disabled after failed connection attempts"
        );
        Self {
            conn: None,
            available: AtomicBool::new(false),
        }
    }

    async fn try_connect(url: &str) -> Result<ConnectionManager, CacheError> {
        let client = Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(conn)
    }

    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.conn.clone().ok_or(CacheError::Unavailable)
    }

    fn track<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        match &result {
            Ok(_) => self.available.store(true, Ordering::Relaxed),
            Err(CacheError::Backend(_)) => self.available.store(false, Ordering::Relaxed),
            Err(_) => {}
        }
        result
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection()?;
        let result = conn.get(key).await.map_err(CacheError::from);
        self.track(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let result = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(CacheError::from);
        self.track(result)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;
        let result = conn
            .del::<_, i64>(key)
            .await
            .map(|deleted| deleted > 0)
            .map_err(CacheError::from);
        self.track(result)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection()?;

        // SCAN rather than KEYS so a large keyspace is walked incrementally.
        let keys: Vec<String> = {
            let mut iter = match conn.scan_match::<_, String>(pattern).await {
                Ok(iter) => iter,
                Err(err) => return self.track(Err(CacheError::from(err))),
            };
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut deleted = 0u64;
        for chunk in keys.chunks(SCAN_DELETE_CHUNK) {
            match conn.del::<_, i64>(chunk).await {
                Ok(count) => deleted += count.max(0) as u64,
                Err(err) => return self.track(Err(CacheError::from(err))),
            }
        }
        self.track(Ok(deleted))
    }

    fn is_available(&self) -> bool {
        self.conn.is_some() && self.available.load(Ordering::Relaxed)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local backend with lazy TTL expiry. Used when no Redis URL is
/// configured, and throughout the test suite.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip availability, simulating a backend outage.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    fn guard(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(CacheError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn expired(entry: &(Vec<u8>, Option<Instant>)) -> bool {
        entry.1.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.guard()?;
        let mut entries = self.entries.write().expect("cache entries lock poisoned");
        match entries.get(key) {
            Some(entry) if Self::expired(entry) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.0.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.guard()?;
        let deadline = Instant::now().checked_add(ttl);
        self.entries
            .write()
            .expect("cache entries lock poisoned")
            .insert(key.to_string(), (value.to_vec(), deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.guard()?;
        Ok(self
            .entries
            .write()
            .expect("cache entries lock poisoned")
            .remove(key)
            .is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        self.guard()?;
        let mut entries = self.entries.write().expect("cache entries lock poisoned");
        let matching: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        for key in &matching {
            entries.remove(key);
        }
        Ok(matching.len() as u64)
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Relaxed)
    }
}

/// Minimal glob: `*` matches any run of characters, everything else is
/// literal. That covers the closed [`KeyPattern`](super::KeyPattern) set.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let mut segments = pattern.split('*');
    let first = segments.next().unwrap_or_default();
    if !candidate.starts_with(first) {
        return false;
    }
    if !pattern.contains('*') {
        return candidate == pattern;
    }

    let mut rest = &candidate[first.len()..];
    let mut last_segment: Option<&str> = None;
    for segment in segments {
        last_segment = Some(segment);
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(at) => rest = &rest[at + segment.len()..],
            None => return false,
        }
    }
    // A trailing literal must anchor at the end of the candidate.
    match last_segment {
        Some(segment) if !segment.is_empty() => candidate.ends_with(segment),
        _ => true,
    }
}
