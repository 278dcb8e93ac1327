//! Redis cache store
//!
//! Uses a `ConnectionManager`, which reconnects transparently after drops.
//! Pattern deletes iterate with `SCAN` and never issue `KEYS`.

#[cfg(any(feature = "redis", test))]
use std::collections::HashMap;

#[cfg(any(feature = "redis", test))]
use crate::store::StoreInfo;

#[cfg(feature = "redis")]
pub use self::backend::RedisStore;

#[cfg(feature = "redis")]
mod backend {
    use redis::{aio::ConnectionManager, AsyncCommands};
    use std::time::Duration;
    use tributary_core::CacheConfig;

    use super::{parse_info, store_info_from};
    use crate::error::{CacheError, CacheResult};
    use crate::store::{CacheStore, StoreInfo};

    const SCAN_BATCH: usize = 200;

    /// Redis-backed store
    pub struct RedisStore {
        url: String,
        conn: ConnectionManager,
    }

    impl RedisStore {
        /// Connect using the `[cache]` config section
        pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
            let url = config.redis_url();
            let client = redis::Client::open(url.as_str())
                .map_err(|e| CacheError::Unavailable(format!("invalid Redis URL {}: {}", url, e)))?;

            let timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
            let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| CacheError::Unavailable(format!("timed out connecting to {}", url)))??;

            let store = Self { url, conn };
            if !store.ping().await {
                return Err(CacheError::Unavailable(format!("no PING reply from {}", store.url)));
            }
            Ok(store)
        }

        pub fn url(&self) -> &str {
            &self.url
        }
    }

    #[async_trait::async_trait]
    impl CacheStore for RedisStore {
        fn backend(&self) -> &'static str {
            "redis"
        }

        async fn ping(&self) -> bool {
            let mut conn = self.conn.clone();
            let reply: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            match reply {
                Ok(_) => true,
                Err(err) => {
                    tracing::debug!(error = %err, "Redis ping failed");
                    false
                }
            }
        }

        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            let mut conn = self.conn.clone();
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        }

        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
            let mut conn = self.conn.clone();
            let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            Ok(())
        }

        async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
            let mut conn = self.conn.clone();
            let mut cursor: u64 = 0;
            let mut deleted = 0;

            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await?;

                if !keys.is_empty() {
                    let removed: u64 = conn.del(&keys).await?;
                    deleted += removed;
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }

            Ok(deleted)
        }

        async fn flush(&self) -> CacheResult<()> {
            let mut conn = self.conn.clone();
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            Ok(())
        }

        async fn info(&self) -> CacheResult<StoreInfo> {
            let mut conn = self.conn.clone();
            let text: String = redis::cmd("INFO").query_async(&mut conn).await?;
            let total_keys: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
            Ok(store_info_from(&parse_info(&text), total_keys))
        }
    }
}

#[cfg(any(feature = "redis", test))]
/// Parse `INFO` output (`key:value` lines, `#` section headers)
pub(crate) fn parse_info(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(any(feature = "redis", test))]
pub(crate) fn store_info_from(info: &HashMap<String, String>, total_keys: u64) -> StoreInfo {
    let counter = |name: &str| info.get(name).and_then(|v| v.parse().ok()).unwrap_or(0);

    StoreInfo {
        used_memory_human: info.get("used_memory_human").cloned(),
        total_keys,
        hits: counter("keyspace_hits"),
        misses: counter("keyspace_misses"),
    }
}
