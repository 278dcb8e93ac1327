//! In-process cache store with TTL
//!
//! An expired entry is evicted when it is read. Writes also sweep the whole
//! map once per sweep interval, so keys that are never read again do not
//! accumulate. Used for local runs without Redis and throughout the test
//! suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, StoreInfo};

/// Cache entry with its own expiry
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,

    /// When this entry was created
    created_at: Instant,

    /// Time-to-live for this entry
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self) -> bool {
        self.created_at.elapsed() < self.ttl
    }
}

/// Default time between write-triggered sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type Entries = HashMap<String, CacheEntry>;

/// Take a live value, or drop the entry if it is still expired
///
/// Runs under the write lock, so an entry replaced since the caller's read
/// is served rather than deleted.
fn take_live_or_evict(entries: &mut Entries, key: &str) -> Option<String> {
    match entries.get(key) {
        Some(entry) if entry.is_valid() => Some(entry.value.clone()),
        Some(_) => {
            entries.remove(key);
            None
        }
        None => None,
    }
}

/// TTL map behind a lock, with hit/miss counters
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<Entries>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sweep_interval: Duration,
    last_sweep: Arc<Mutex<Instant>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: Arc::default(),
            hits: Arc::default(),
            misses: Arc::default(),
            sweep_interval,
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Number of entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict all expired entries
    pub fn evict_expired(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| entry.is_valid());
        }
    }

    /// Whether a sweep is due; claims it for the caller if so
    fn sweep_due(&self) -> bool {
        let Ok(mut last) = self.last_sweep.lock() else {
            return false;
        };
        if last.elapsed() < self.sweep_interval {
            return false;
        }
        *last = Instant::now();
        true
    }

    /// Remaining lifetime of a key, if present and live
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key).filter(|e| e.is_valid())?;
        Some(entry.ttl.saturating_sub(entry.created_at.elapsed()))
    }

    fn poisoned() -> CacheError {
        CacheError::Backend("memory store lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> bool {
        !self.entries.is_poisoned()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let found = {
            let entries = self.entries.read().map_err(|_| Self::poisoned())?;
            entries.get(key).map(|entry| (entry.is_valid(), entry.value.clone()))
        };

        match found {
            Some((true, value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Some((false, _)) => {
                let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
                match take_live_or_evict(&mut entries, key) {
                    Some(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        Ok(Some(value))
                    }
                    None => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        Ok(None)
                    }
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl,
        };
        let sweep = self.sweep_due();
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if sweep {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_valid());
            tracing::debug!(evicted = before - entries.len(), "swept expired cache entries");
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.write().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }

    async fn info(&self) -> CacheResult<StoreInfo> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        let (count, bytes) = entries
            .iter()
            .filter(|(_, e)| e.is_valid())
            .fold((0u64, 0usize), |(n, b), (k, e)| (n + 1, b + k.len() + e.value.len()));

        Ok(StoreInfo {
            used_memory_human: Some(human_bytes(bytes)),
            total_keys: count,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

/// Redis-style glob match supporting `*` and `?`
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

/// Format like Redis `used_memory_human`
pub(crate) fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn stores_and_expires() {
        let store = MemoryStore::new();
        store
            .set_ex("lineage:a", "1".into(), Duration::from_millis(30))
            .await
            .unwrap();

        assert_eq!(store.get("lineage:a").await.unwrap(), Some("1".to_string()));
        assert!(store.ttl_of("lineage:a").is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("lineage:a").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn writes_sweep_expired_entries() {
        let store = MemoryStore::with_sweep_interval(Duration::from_millis(5));
        for i in 0..1000 {
            store
                .set_ex(&format!("preview:{}", i), "{}".into(), Duration::from_millis(1))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .set_ex("assets:all_projects", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.info().await.unwrap().total_keys, 1);
    }

    #[tokio::test]
    async fn sweeps_wait_for_the_interval() {
        let store = MemoryStore::with_sweep_interval(Duration::from_secs(3600));
        store.set_ex("meta:a", "1".into(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set_ex("meta:b", "2".into(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.len(), 2);
        store.evict_expired();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_read_keeps_a_replaced_entry() {
        let mut entries = Entries::new();
        entries.insert(
            "meta:a".to_string(),
            CacheEntry {
                value: "new".to_string(),
                created_at: Instant::now(),
                ttl: Duration::from_secs(60),
            },
        );
        entries.insert(
            "meta:b".to_string(),
            CacheEntry {
                value: "old".to_string(),
                created_at: Instant::now(),
                ttl: Duration::ZERO,
            },
        );

        assert_eq!(take_live_or_evict(&mut entries, "meta:a"), Some("new".to_string()));
        assert!(entries.contains_key("meta:a"));
        assert_eq!(take_live_or_evict(&mut entries, "meta:b"), None);
        assert!(!entries.contains_key("meta:b"));
        assert_eq!(take_live_or_evict(&mut entries, "meta:c"), None);
    }

    #[tokio::test]
    async fn deletes_by_pattern() {
        let store = MemoryStore::new();
        for key in ["lineage:a", "lineage:b", "assets:all_projects"] {
            store.set_ex(key, "{}".into(), Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(store.delete_pattern("lineage:*").await.unwrap(), 2);
        assert_eq!(store.delete_pattern("lineage:*").await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn counts_hits_and_misses() {
        let store = MemoryStore::new();
        store.set_ex("k", "v".into(), Duration::from_secs(60)).await.unwrap();

        store.get("k").await.unwrap();
        store.get("k").await.unwrap();
        store.get("missing").await.unwrap();

        let info = store.info().await.unwrap();
        assert_eq!(info.hits, 2);
        assert_eq!(info.misses, 1);
        assert_eq!(info.total_keys, 1);
        assert_eq!(info.used_memory_human.as_deref(), Some("2B"));
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match("lineage:*", "lineage:p:d:t:both:3"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("meta:?", "meta:x"));
        assert!(glob_match("a*c*e", "abcde"));
        assert!(!glob_match("lineage:*", "assets:lineage:x"));
        assert!(!glob_match("meta:?", "meta:xy"));
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(human_bytes(512), "512B");
        assert_eq!(human_bytes(2048), "2.00K");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00M");
    }
}
