//! Bounded, time-limited access to a warehouse adapter
//!
//! `GuardedAdapter` wraps any adapter with three controls shared by every
//! caller in the process:
//!
//! - a semaphore capping in-flight warehouse calls,
//! - a per-call timeout,
//! - retry with backoff for transient errors.
//!
//! Dropping the returned future (for example when an HTTP client goes away)
//! drops the in-flight call and releases its permit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tributary_core::{TableIdentifier, WarehouseConfig};

use crate::adapter::{FetchError, WarehouseAdapter};
use crate::jobs::{EdgeJobQuery, FailureQuery, ReferenceQuery};
use crate::retry::RetryPolicy;
use crate::types::{DatasetInfo, JobFailure, JobRecord, QueryResult, TableMetadata, TableSummary};

/// Concurrency-limited adapter decorator
pub struct GuardedAdapter {
    inner: Arc<dyn WarehouseAdapter>,
    permits: Semaphore,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GuardedAdapter {
    pub fn new(
        inner: Arc<dyn WarehouseAdapter>,
        max_concurrency: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrency.max(1)),
            timeout,
            retry,
        }
    }

    /// Build from the `[warehouse]` config section
    pub fn from_config(inner: Arc<dyn WarehouseAdapter>, config: &WarehouseConfig) -> Self {
        Self::new(
            inner,
            config.max_concurrency,
            Duration::from_secs(config.query_timeout_secs),
            RetryPolicy::from(&config.retry),
        )
    }

    /// Calls that could start right now without waiting
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn guarded<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let permits = &self.permits;
        let timeout = self.timeout;

        self.retry
            .run(label, || {
                let call = op();
                async move {
                    let _permit = permits
                        .acquire()
                        .await
                        .map_err(|_| FetchError::ConfigError("warehouse pool closed".to_string()))?;

                    match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout(timeout.as_secs())),
                    }
                }
            })
            .await
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for GuardedAdapter {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn project_id(&self) -> &str {
        self.inner.project_id()
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.guarded("test_connection", || self.inner.test_connection()).await
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetInfo>, FetchError> {
        self.guarded("list_datasets", || self.inner.list_datasets(project)).await
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableSummary>, FetchError> {
        self.guarded("list_tables", || self.inner.list_tables(project, dataset)).await
    }

    async fn fetch_table_metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, FetchError> {
        self.guarded("fetch_table_metadata", || self.inner.fetch_table_metadata(table)).await
    }

    async fn preview_rows(&self, table: &TableIdentifier, limit: u32) -> Result<QueryResult, FetchError> {
        self.guarded("preview_rows", || self.inner.preview_rows(table, limit)).await
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResult, FetchError> {
        self.guarded("run_query", || self.inner.run_query(sql)).await
    }

    async fn lineage_references(&self, query: &ReferenceQuery) -> Result<Vec<TableIdentifier>, FetchError> {
        self.guarded("lineage_references", || self.inner.lineage_references(query)).await
    }

    async fn recent_failures(&self, query: &FailureQuery) -> Result<Vec<JobFailure>, FetchError> {
        self.guarded("recent_failures", || self.inner.recent_failures(query)).await
    }

    async fn edge_job(&self, query: &EdgeJobQuery) -> Result<Option<JobRecord>, FetchError> {
        self.guarded("edge_job", || self.inner.edge_job(query)).await
    }
}
