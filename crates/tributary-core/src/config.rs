//! Configuration schema (tributary.toml)
//!
//! Every section is optional. Values from the file are overlaid by
//! environment variables (see [`Config::apply_env`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Retry policy for transient warehouse failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Warehouse connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Billing/default project; falls back to GOOGLE_CLOUD_PROJECT
    pub project_id: Option<String>,

    /// Region qualifier for INFORMATION_SCHEMA job views
    pub location: String,

    /// Service account key file; ADC is used when unset
    pub credentials_path: Option<String>,

    /// Upper bound on in-flight warehouse calls
    pub max_concurrency: usize,

    pub query_timeout_secs: u64,

    pub retry: RetryConfig,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: "region-us".to_string(),
            credentials_path: None,
            max_concurrency: 10,
            query_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Which cache store to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
    Disabled,
}

impl std::str::FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::Invalid(format!("unknown cache backend '{}'", other))),
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub connect_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            connect_timeout_secs: 5,
        }
    }
}

impl CacheConfig {
    /// Connection URL for the Redis backend
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Lineage discovery bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub default_depth: u32,
    /// Requested depths are clamped to `1..=max_depth`
    pub max_depth: u32,
    /// Job-history lookback window
    pub lookback_days: u32,
    /// Row cap per job-history query
    pub result_limit: u32,
    /// Frontier tables queried concurrently per level
    pub frontier_concurrency: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            max_depth: 5,
            lookback_days: 30,
            result_limit: 100,
            frontier_concurrency: 4,
        }
    }
}

/// Root-cause heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Ancestors probed concurrently
    pub concurrency: usize,
    pub fresh_hours: f64,
    pub stale_hours: f64,
    /// Modifications younger than this are flagged as potential breaking changes
    pub breaking_change_hours: f64,
    pub failure_lookback_hours: u32,
    /// Failures fetched per ancestor
    pub failure_limit: u32,
    /// Lineage depth used to collect ancestors
    pub lineage_depth: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            fresh_hours: 24.0,
            stale_hours: 168.0,
            breaking_change_hours: 24.0,
            failure_lookback_hours: 24,
            failure_limit: 5,
            lineage_depth: 5,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub lineage: LineageConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.apply_overrides(&vars)
    }

    /// Overlay values from an explicit variable map
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(host) = vars.get("TRIBUTARY_HOST") {
            self.server.host = host.clone();
        }
        if let Some(port) = vars.get("TRIBUTARY_PORT") {
            self.server.port = parse_var("TRIBUTARY_PORT", port)?;
        }
        if let Some(project) = vars.get("GOOGLE_CLOUD_PROJECT") {
            if self.warehouse.project_id.is_none() {
                self.warehouse.project_id = Some(project.clone());
            }
        }
        if let Some(path) = vars.get("GOOGLE_APPLICATION_CREDENTIALS") {
            if self.warehouse.credentials_path.is_none() {
                self.warehouse.credentials_path = Some(path.clone());
            }
        }
        if let Some(backend) = vars.get("TRIBUTARY_CACHE_BACKEND") {
            self.cache.backend = backend.parse()?;
        }
        if let Some(host) = vars.get("REDIS_HOST") {
            self.cache.host = host.clone();
        }
        if let Some(port) = vars.get("REDIS_PORT") {
            self.cache.port = parse_var("REDIS_PORT", port)?;
        }
        if let Some(db) = vars.get("REDIS_DB") {
            self.cache.db = parse_var("REDIS_DB", db)?;
        }
        Ok(())
    }

    /// Clamp a requested lineage depth into the configured range
    pub fn clamp_depth(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.lineage.default_depth)
            .clamp(1, self.lineage.max_depth.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has invalid value '{}'", name, value)))
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}
