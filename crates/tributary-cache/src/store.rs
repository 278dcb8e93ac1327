//! Cache store trait and the disabled store
//!
//! Values are opaque JSON strings; the [`CacheLayer`](crate::CacheLayer)
//! owns serialization.

use std::sync::Arc;
use std::time::Duration;
use tributary_core::{CacheBackend, CacheConfig};

use crate::error::{CacheError, CacheResult};
use crate::memory::MemoryStore;
#[cfg(feature = "redis")]
use crate::redis_store::RedisStore;

/// Server-side statistics reported by a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreInfo {
    pub used_memory_human: Option<String>,
    pub total_keys: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Key/value store with per-key expiry
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Whether the store can serve requests right now
    async fn ping(&self) -> bool;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Delete keys matching a glob pattern; returns the number deleted
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    /// Drop every key
    async fn flush(&self) -> CacheResult<()>;

    async fn info(&self) -> CacheResult<StoreInfo>;
}

/// Store used when caching is turned off or its backend is unreachable
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait::async_trait]
impl CacheStore for DisabledStore {
    fn backend(&self) -> &'static str {
        "disabled"
    }

    async fn ping(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn delete_pattern(&self, _pattern: &str) -> CacheResult<u64> {
        Ok(0)
    }

    async fn flush(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn info(&self) -> CacheResult<StoreInfo> {
        Err(CacheError::Unavailable("caching disabled".to_string()))
    }
}

/// Build the configured store
///
/// A Redis backend that cannot be reached degrades to [`DisabledStore`];
/// startup never fails because of the cache.
pub async fn build_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    match config.backend {
        CacheBackend::Disabled => {
            tracing::info!("cache disabled by configuration");
            Arc::new(DisabledStore)
        }
        CacheBackend::Memory => {
            tracing::info!("using in-process cache");
            Arc::new(MemoryStore::new())
        }
        CacheBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &CacheConfig) -> Arc<dyn CacheStore> {
    match RedisStore::connect(config).await {
        Ok(store) => {
            tracing::info!(host = %config.host, port = config.port, db = config.db, "connected to Redis");
            Arc::new(store)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Redis unavailable, continuing without cache");
            Arc::new(DisabledStore)
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(config: &CacheConfig) -> Arc<dyn CacheStore> {
    tracing::warn!(
        url = %config.redis_url(),
        "Redis support not compiled (rebuild with --features redis), continuing without cache"
    );
    Arc::new(DisabledStore)
}
