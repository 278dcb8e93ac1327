//! Warehouse adapter trait
//!
//! The adapter is the only way the service reaches the warehouse. Job-history
//! mining goes through typed query descriptions ([`ReferenceQuery`],
//! [`FailureQuery`], [`EdgeJobQuery`]) so that a real adapter can render them
//! to SQL while test doubles evaluate them in memory.

use tributary_core::{ServiceError, TableIdentifier};

use crate::jobs::{EdgeJobQuery, FailureQuery, ReferenceQuery};
use crate::types::{DatasetInfo, JobFailure, JobRecord, QueryResult, TableMetadata, TableSummary};

/// Errors that can occur when talking to the warehouse
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FetchError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::RateLimited(_) | Self::Timeout(_)
        )
    }

    /// Classify a raw warehouse error message
    pub fn from_message(message: impl Into<String>, subject: &str) -> Self {
        let message = message.into();
        if message.contains("Not found") {
            Self::TableNotFound(subject.to_string())
        } else if message.contains("Access Denied") || message.contains("Permission") {
            Self::PermissionDenied(format!("Cannot access {}: {}", subject, message))
        } else if message.contains("rateLimitExceeded") || message.contains("quotaExceeded") {
            Self::RateLimited(message)
        } else if message.contains("backendError") || message.contains("connection") {
            Self::NetworkError(message)
        } else {
            Self::QueryError(message)
        }
    }
}

impl From<FetchError> for ServiceError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::TableNotFound(what) => ServiceError::NotFound(what),
            FetchError::PermissionDenied(detail) | FetchError::AuthenticationError(detail) => {
                ServiceError::Forbidden(detail)
            }
            other => ServiceError::Upstream(other.to_string()),
        }
    }
}

/// Trait for warehouse adapters
#[async_trait::async_trait]
pub trait WarehouseAdapter: Send + Sync {
    /// Get the adapter name (e.g., "BigQuery")
    fn name(&self) -> &'static str;

    /// Default project used for listings and job-history views
    fn project_id(&self) -> &str;

    /// Test the connection to the warehouse
    async fn test_connection(&self) -> Result<(), FetchError>;

    /// List datasets in a project
    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetInfo>, FetchError>;

    /// List tables (with size and timestamps) in a dataset
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableSummary>, FetchError>;

    /// Fetch schema, partitioning, clustering and timestamps for one table
    async fn fetch_table_metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, FetchError>;

    /// Read the first `limit` rows of a table
    async fn preview_rows(&self, table: &TableIdentifier, limit: u32) -> Result<QueryResult, FetchError>;

    /// Execute arbitrary SQL
    async fn run_query(&self, sql: &str) -> Result<QueryResult, FetchError>;

    /// Distinct tables related to `query.table` through write jobs
    async fn lineage_references(&self, query: &ReferenceQuery) -> Result<Vec<TableIdentifier>, FetchError>;

    /// Recently failed jobs touching a table, newest first
    async fn recent_failures(&self, query: &FailureQuery) -> Result<Vec<JobFailure>, FetchError>;

    /// Most recent job that wrote `query.target` while reading `query.source`
    async fn edge_job(&self, query: &EdgeJobQuery) -> Result<Option<JobRecord>, FetchError>;
}
