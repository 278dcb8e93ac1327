//! Tributary Core
//!
//! Shared domain model: table identity, the lineage graph, health
//! vocabulary, configuration and the service error taxonomy.

pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod lineage;

pub use config::{
    AnalysisConfig, CacheBackend, CacheConfig, Config, ConfigError, LineageConfig, RetryConfig,
    ServerConfig, WarehouseConfig,
};
pub use error::ServiceError;
pub use health::{age_hours, Freshness, FreshnessThresholds, Severity};
pub use identity::TableIdentifier;
pub use lineage::{Direction, EdgeKind, LineageEdge, LineageGraph, LineageNode, NodeKind};
