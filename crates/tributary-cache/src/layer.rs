//! Cache-aside orchestration
//!
//! Every operation pings the store first; an unreachable store behaves as an
//! empty one. Store failures are logged and never reach the caller.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::CacheError;
use crate::keys::{is_allowed_pattern, CacheKey};
use crate::store::{CacheStore, DisabledStore};

/// A payload plus whether it was served from cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached<T> {
    #[serde(flatten)]
    pub value: T,
    pub cached: bool,
}

impl<T> Cached<T> {
    pub fn fresh(value: T) -> Self {
        Self { value, cached: false }
    }

    pub fn hit(value: T) -> Self {
        Self { value, cached: true }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
        Cached {
            value: f(self.value),
            cached: self.cached,
        }
    }
}

/// Cache statistics as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub connected: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory_human: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_keys: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hits: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub misses: Option<u64>,

    /// Percentage, two decimals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
}

impl CacheStats {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            backend: None,
            used_memory_human: None,
            total_keys: None,
            hits: None,
            misses: None,
            hit_rate: None,
        }
    }
}

/// `hits / (hits + misses) * 100`, rounded to two decimals
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let rate = hits as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Cache-aside wrapper around a [`CacheStore`]
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledStore))
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Read a decodable value; any store problem counts as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.store.ping().await {
            return None;
        }

        match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cache read failed");
                None
            }
        }
    }

    /// Best-effort write with the kind's TTL
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if !self.store.ping().await {
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cannot serialize cache value");
                return;
            }
        };

        if let Err(err) = self.store.set_ex(key.as_str(), raw, key.ttl()).await {
            tracing::warn!(key = %key, error = %err, "cache write failed");
        }
    }

    /// Serve from cache or compute from the source and store the result
    ///
    /// Errors from `compute` are returned unchanged and never cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            tracing::debug!(key = %key, "cache hit");
            return Ok(Cached::hit(value));
        }

        tracing::debug!(key = %key, "cache miss");
        let value = compute().await?;
        self.put(key, &value).await;
        Ok(Cached::fresh(value))
    }

    /// Flush everything; returns whether the store was reachable
    pub async fn clear(&self) -> bool {
        if !self.store.ping().await {
            return false;
        }

        match self.store.flush().await {
            Ok(()) => {
                tracing::info!(backend = self.store.backend(), "cache cleared");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache flush failed");
                false
            }
        }
    }

    /// Delete keys matching an allow-listed pattern
    pub async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        if !is_allowed_pattern(pattern) {
            return Err(CacheError::InvalidPattern(pattern.to_string()));
        }

        if !self.store.ping().await {
            return Ok(0);
        }

        match self.store.delete_pattern(pattern).await {
            Ok(deleted) => {
                tracing::info!(pattern, deleted, "cache entries invalidated");
                Ok(deleted)
            }
            Err(err) => {
                tracing::warn!(pattern, error = %err, "cache invalidation failed");
                Ok(0)
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        if !self.store.ping().await {
            return CacheStats::disconnected();
        }

        match self.store.info().await {
            Ok(info) => CacheStats {
                connected: true,
                backend: Some(self.store.backend().to_string()),
                used_memory_human: info.used_memory_human,
                total_keys: Some(info.total_keys),
                hits: Some(info.hits),
                misses: Some(info.misses),
                hit_rate: Some(hit_rate(info.hits, info.misses)),
            },
            Err(err) => {
                tracing::warn!(error = %err, "cannot read cache stats");
                CacheStats::disconnected()
            }
        }
    }
}
