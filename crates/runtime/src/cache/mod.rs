//! Response cache in front of inference
//!
//! Entries are keyed by [`cache_key`] and expire after a tier-dependent TTL.
//! The cache is fail-open: every failure surfaces as a [`CacheError`] that
//! the caller treats as a miss, and a cache without a backend always misses.

pub mod backend;
pub mod key;

pub use backend::{CacheBackend, MemoryCacheBackend};
#[cfg(feature = "redis-cache")]
pub use backend::RedisCacheBackend;
pub use key::{cache_key, normalize_context, normalize_text};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::contracts::Constraints;
use crate::routing::Tier;

/// Cache errors, never fatal to a request
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {message}")]
    Backend { message: String },

    #[error("Malformed cache entry: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode cache entry: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

/// A memoized inference result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    /// Lifetime the entry was stored with; set by [`ResponseCache::store`]
    #[serde(default)]
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn new(response: String, input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        Self {
            response,
            input_tokens,
            output_tokens,
            cost,
            ttl_seconds: 0,
        }
    }
}

/// Time to live for entries of a tier
pub fn ttl_for_tier(tier: Tier) -> Duration {
    match tier {
        Tier::Small => Duration::from_secs(3600),
        Tier::Medium => Duration::from_secs(1800),
        Tier::Api => Duration::from_secs(300),
    }
}

/// Tier-aware response cache
#[derive(Clone, Default)]
pub struct ResponseCache {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A cache that always misses
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn memory(max_entries: usize) -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new(max_entries)))
    }

    /// Build the configured cache.
    ///
    /// A backend that cannot be reached at start-up leaves the cache
    /// disabled rather than failing the process.
    pub async fn from_config(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackendKind::Disabled => Self::disabled(),
            CacheBackendKind::Memory => Self::memory(config.max_entries),
            CacheBackendKind::Redis => Self::connect_redis(config).await,
        }
    }

    #[cfg(feature = "redis-cache")]
    async fn connect_redis(config: &CacheConfig) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            tracing::warn!("Redis cache selected without a URL, caching disabled");
            return Self::disabled();
        };
        match RedisCacheBackend::connect(url).await {
            Ok(backend) => Self::new(Arc::new(backend)),
            Err(e) => {
                tracing::warn!("Redis unavailable, caching disabled: {}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "redis-cache"))]
    async fn connect_redis(_config: &CacheConfig) -> Self {
        tracing::warn!("Built without the redis-cache feature, caching disabled");
        Self::disabled()
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("disabled")
    }

    /// Look up the memoized response for a request on a tier
    pub async fn lookup(
        &self,
        tier: Tier,
        prompt: &str,
        context: &[String],
        constraints: &Constraints,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };

        let key = cache_key(tier, prompt, context, constraints);
        match backend.get(&key).await? {
            Some(raw) => {
                let entry = serde_json::from_str(&raw)
                    .map_err(|source| CacheError::Malformed { source })?;
                tracing::debug!("Cache hit on {} for key {}", tier, key);
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Memoize a successful inference result with the tier's TTL.
    ///
    /// The stored payload records that TTL in `ttl_seconds`.
    pub async fn store(
        &self,
        tier: Tier,
        prompt: &str,
        context: &[String],
        constraints: &Constraints,
        entry: &CacheEntry,
    ) -> Result<(), CacheError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let key = cache_key(tier, prompt, context, constraints);
        let ttl = ttl_for_tier(tier);
        let stamped = CacheEntry {
            ttl_seconds: ttl.as_secs(),
            ..entry.clone()
        };
        let raw = serde_json::to_string(&stamped).map_err(|source| CacheError::Encode { source })?;
        backend.set(&key, &raw, ttl).await
    }
}
