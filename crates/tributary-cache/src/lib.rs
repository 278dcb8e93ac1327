//! Tributary cache layer
//!
//! Cache-aside caching for warehouse-backed responses. Each [`CacheKind`]
//! fixes a key namespace and TTL; the [`CacheLayer`] derives keys, serves
//! hits, writes misses back, and handles allow-listed invalidation.
//!
//! The cache is never authoritative. When the store is unreachable every
//! read is a miss and every write is dropped.
//!
//! ## Features
//!
//! - `redis` - Redis store via `ConnectionManager`
//!
//! ## Usage
//!
//! ```rust,ignore
//! let layer = CacheLayer::new(build_store(&config.cache).await);
//! let key = CacheKind::Lineage.key(&[&table, &direction, &depth]);
//! let graph = layer.get_or_compute(&key, || builder.build(&table, direction, depth)).await?;
//! ```

pub mod error;
pub mod keys;
pub mod layer;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use keys::{allowed_patterns, derive_key, is_allowed_pattern, CacheKey, CacheKind};
pub use layer::{hit_rate, CacheLayer, CacheStats, Cached};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{build_store, CacheStore, DisabledStore, StoreInfo};
