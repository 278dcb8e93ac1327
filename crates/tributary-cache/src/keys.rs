//! Cache namespaces, TTL policy and key derivation

use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Argument strings longer than this are replaced by a digest
pub const MAX_ARGS_LEN: usize = 100;

const HOUR: u64 = 60 * 60;

/// Kind of cached data; fixes both the key namespace and the TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Dataset/table listing with columns
    Schema,
    /// Project/dataset/asset inventory
    Assets,
    /// Per-table metadata
    TableMetadata,
    Lineage,
    Preview,
    /// Job that produced an edge
    EdgeQuery,
    /// Recent job failures for a table
    Failures,
    /// Ad-hoc SELECT results
    Query,
    /// User-authored explorations
    Exploration,
}

impl CacheKind {
    pub const ALL: [CacheKind; 9] = [
        CacheKind::Lineage,
        CacheKind::Assets,
        CacheKind::Schema,
        CacheKind::Query,
        CacheKind::TableMetadata,
        CacheKind::Preview,
        CacheKind::EdgeQuery,
        CacheKind::Failures,
        CacheKind::Exploration,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            CacheKind::Schema => "schema",
            CacheKind::Assets => "assets",
            CacheKind::TableMetadata => "meta",
            CacheKind::Lineage => "lineage",
            CacheKind::Preview => "preview",
            CacheKind::EdgeQuery => "edge",
            CacheKind::Failures => "failures",
            CacheKind::Query => "query",
            CacheKind::Exploration => "exp",
        }
    }

    pub fn ttl(&self) -> Duration {
        let secs = match self {
            CacheKind::Schema => 12 * HOUR,
            CacheKind::Assets | CacheKind::TableMetadata => 6 * HOUR,
            CacheKind::Lineage
            | CacheKind::Preview
            | CacheKind::EdgeQuery
            | CacheKind::Failures
            | CacheKind::Exploration => HOUR,
            CacheKind::Query => 5 * 60,
        };
        Duration::from_secs(secs)
    }

    /// Pattern that matches every key of this kind
    pub fn pattern(&self) -> String {
        format!("{}:*", self.prefix())
    }

    /// Derive a key in this kind's namespace
    pub fn key(&self, args: &[&dyn fmt::Display]) -> CacheKey {
        CacheKey {
            kind: *self,
            key: derive_key(self.prefix(), args),
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A derived key together with the kind that owns it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub key: String,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.kind.ttl()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// `prefix:arg1:arg2:...`, digesting the argument portion when it is long
pub fn derive_key(prefix: &str, args: &[&dyn fmt::Display]) -> String {
    let joined = args
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(":");

    if joined.len() > MAX_ARGS_LEN {
        let digest = hex::encode(Sha256::digest(joined.as_bytes()));
        format!("{}:{}", prefix, &digest[..16])
    } else {
        format!("{}:{}", prefix, joined)
    }
}

/// Patterns accepted by pattern invalidation
pub fn allowed_patterns() -> Vec<String> {
    CacheKind::ALL.iter().map(CacheKind::pattern).collect()
}

pub fn is_allowed_pattern(pattern: &str) -> bool {
    CacheKind::ALL.iter().any(|kind| kind.pattern() == pattern)
}
