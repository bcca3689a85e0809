//! Cache storage backends

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::CacheError;

/// Key-value store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch a live value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value that expires after `ttl`; last writer wins
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process backend on a concurrent map
#[derive(Debug)]
pub struct MemoryCacheBackend {
    store: DashMap<String, MemoryEntry>,
    max_entries: usize,
}

impl MemoryCacheBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: DashMap::new(),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Make room for one entry: drop expired entries first, then the one
    /// closest to expiry
    fn evict(&self) {
        let now = Instant::now();
        self.store.retain(|_, entry| entry.expires_at > now);
        if self.store.len() < self.max_entries {
            return;
        }

        // Collect the key before removing so no shard guard is held
        let victim = self
            .store
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.store.remove(&key);
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let expired = match self.store.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.store.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if self.max_entries > 0
            && self.store.len() >= self.max_entries
            && !self.store.contains_key(key)
        {
            self.evict();
        }
        self.store.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Redis backend using `SETEX`
#[cfg(feature = "redis-cache")]
pub struct RedisCacheBackend {
    client: redis::Client,
}

#[cfg(feature = "redis-cache")]
impl RedisCacheBackend {
    /// Open a client and check the server answers `PING`
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend_error)?;
        Ok(Self { client })
    }
}

#[cfg(feature = "redis-cache")]
fn backend_error(err: redis::RedisError) -> CacheError {
    CacheError::Backend {
        message: err.to_string(),
    }
}

#[cfg(feature = "redis-cache")]
#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(backend_error)
    }
}
