//! Mock warehouse adapter for testing
//!
//! This adapter simulates a warehouse in memory without connecting to
//! anything. It keeps:
//! - a job-history log that the lineage queries are evaluated against,
//! - table metadata used for listings, previews and health checks,
//! - canned results for exact SQL strings,
//! - per-table and scripted errors to exercise failure paths.
//!
//! It also counts calls per operation and tracks peak concurrency so tests
//! can assert cache hits and pool bounds.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tributary_catalog::{MockAdapter, TableIdentifier};
//!
//! let adapter = MockAdapter::new();
//! adapter
//!     .record_job(write_job("j1", hours_ago(48), "INSERT", orders.clone(), vec![raw_orders.clone()]))
//!     .await;
//! adapter.add_table(TableMetadata::empty(raw_orders)).await;
//! ```

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tributary_core::TableIdentifier;

use crate::adapter::{FetchError, WarehouseAdapter};
use crate::jobs::{EdgeJobQuery, FailureQuery, ReferenceQuery};
use crate::types::{
    DatasetInfo, FieldSchema, JobError, JobFailure, JobRecord, QueryResult, TableMetadata, TableSummary,
};

/// Build a successful write job
pub fn write_job(
    job_id: &str,
    creation_time: DateTime<Utc>,
    statement_type: &str,
    destination: TableIdentifier,
    sources: Vec<TableIdentifier>,
) -> JobRecord {
    let query = format!(
        "{} `{}` SELECT * FROM {}",
        statement_type,
        destination.fqn(),
        sources
            .iter()
            .map(|s| format!("`{}`", s.fqn()))
            .collect::<Vec<_>>()
            .join(" JOIN "),
    );

    JobRecord {
        job_id: job_id.to_string(),
        creation_time,
        statement_type: statement_type.to_string(),
        destination: Some(destination),
        referenced_tables: sources,
        query,
        user_email: Some("etl@example.com".to_string()),
        total_bytes_processed: Some(0),
        error: None,
    }
}

/// Build a failed write job
pub fn failed_job(
    job_id: &str,
    creation_time: DateTime<Utc>,
    destination: TableIdentifier,
    sources: Vec<TableIdentifier>,
    reason: &str,
) -> JobRecord {
    let mut job = write_job(job_id, creation_time, "INSERT", destination, sources);
    job.error = Some(JobError {
        reason: Some(reason.to_string()),
        message: Some(format!("Simulated failure: {}", reason)),
    });
    job
}

/// `now - hours`
pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

/// Mock warehouse adapter for testing
pub struct MockAdapter {
    project_id: String,

    /// Job-history log
    jobs: Arc<RwLock<Vec<JobRecord>>>,

    /// Table metadata by FQN
    tables: Arc<RwLock<BTreeMap<String, TableMetadata>>>,

    /// Dataset locations by `project.dataset`
    locations: Arc<RwLock<HashMap<String, String>>>,

    /// Canned results by exact SQL text
    query_results: Arc<RwLock<HashMap<String, QueryResult>>>,

    /// Errors to return for specific tables
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Errors returned by the next N calls of any kind
    scripted: Arc<RwLock<VecDeque<FetchError>>>,

    calls: Arc<RwLock<HashMap<&'static str, usize>>>,

    in_flight: Arc<AtomicUsize>,

    max_in_flight: Arc<AtomicUsize>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,
}

impl MockAdapter {
    /// Create a new mock adapter for project `mock-project`
    pub fn new() -> Self {
        Self::for_project("mock-project")
    }

    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            jobs: Arc::new(RwLock::new(Vec::new())),
            tables: Arc::new(RwLock::new(BTreeMap::new())),
            locations: Arc::new(RwLock::new(HashMap::new())),
            query_results: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            scripted: Arc::new(RwLock::new(VecDeque::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Append a job to the history log
    pub async fn record_job(&self, job: JobRecord) {
        self.jobs.write().await.push(job);
    }

    /// Register (or replace) table metadata
    pub async fn add_table(&self, metadata: TableMetadata) {
        self.tables.write().await.insert(metadata.table.fqn(), metadata);
    }

    pub async fn set_dataset_location(&self, project: &str, dataset: &str, location: &str) {
        self.locations
            .write()
            .await
            .insert(format!("{}.{}", project, dataset), location.to_string());
    }

    /// Return `result` whenever exactly `sql` is executed
    pub async fn add_query_result(&self, sql: impl Into<String>, result: QueryResult) {
        self.query_results.write().await.insert(sql.into(), result);
    }

    /// Configure an error to be returned for a specific table
    pub async fn add_error_for_table(&self, table: TableIdentifier, error: FetchError) {
        self.errors.write().await.insert(table.fqn(), error);
    }

    /// Fail the next `count` calls with `error`
    pub async fn fail_next_calls(&self, count: usize, error: FetchError) {
        let mut scripted = self.scripted.write().await;
        for _ in 0..count {
            scripted.push_back(error.clone());
        }
    }

    /// Clear all stored errors
    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
        self.scripted.write().await.clear();
    }

    /// Number of times an operation was invoked
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls.read().await.get(operation).copied().unwrap_or(0)
    }

    /// Total invocations across all operations
    pub async fn total_calls(&self) -> usize {
        self.calls.read().await.values().sum()
    }

    /// Peak number of concurrent calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Count the call, apply latency and scripted failures
    async fn enter(&self, operation: &'static str) -> Result<InFlight, FetchError> {
        *self.calls.write().await.entry(operation).or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));

        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        if let Some(error) = self.scripted.write().await.pop_front() {
            return Err(error);
        }

        Ok(guard)
    }

    async fn check_table(&self, table: &TableIdentifier) -> Result<(), FetchError> {
        match self.errors.read().await.get(&table.fqn()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Decrements the in-flight counter on drop
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            project_id: self.project_id.clone(),
            jobs: Arc::clone(&self.jobs),
            tables: Arc::clone(&self.tables),
            locations: Arc::clone(&self.locations),
            query_results: Arc::clone(&self.query_results),
            errors: Arc::clone(&self.errors),
            scripted: Arc::clone(&self.scripted),
            calls: Arc::clone(&self.calls),
            in_flight: Arc::clone(&self.in_flight),
            max_in_flight: Arc::clone(&self.max_in_flight),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
        }
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        let _guard = self.enter("test_connection").await?;

        if self.fail_connection {
            Err(FetchError::NetworkError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetInfo>, FetchError> {
        let _guard = self.enter("list_datasets").await?;

        let tables = self.tables.read().await;
        let locations = self.locations.read().await;
        let mut datasets: Vec<DatasetInfo> = Vec::new();

        for metadata in tables.values().filter(|m| m.table.project == project) {
            if datasets.iter().any(|d| d.dataset_id == metadata.table.dataset) {
                continue;
            }
            datasets.push(DatasetInfo {
                dataset_id: metadata.table.dataset.clone(),
                location: locations
                    .get(&format!("{}.{}", project, metadata.table.dataset))
                    .cloned(),
            });
        }

        Ok(datasets)
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableSummary>, FetchError> {
        let _guard = self.enter("list_tables").await?;

        let tables = self.tables.read().await;
        Ok(tables
            .values()
            .filter(|m| m.table.project == project && m.table.dataset == dataset)
            .map(|m| TableSummary {
                table_id: m.table.table.clone(),
                kind: m.kind,
                row_count: m.num_rows,
                size_bytes: m.num_bytes,
                created_at: m.created_at,
                modified_at: m.modified_at,
            })
            .collect())
    }

    async fn fetch_table_metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, FetchError> {
        let _guard = self.enter("fetch_table_metadata").await?;
        self.check_table(table).await?;

        self.tables
            .read()
            .await
            .get(&table.fqn())
            .cloned()
            .ok_or_else(|| FetchError::TableNotFound(table.fqn()))
    }

    async fn preview_rows(&self, table: &TableIdentifier, limit: u32) -> Result<QueryResult, FetchError> {
        let _guard = self.enter("preview_rows").await?;
        self.check_table(table).await?;

        let tables = self.tables.read().await;
        let metadata = tables
            .get(&table.fqn())
            .ok_or_else(|| FetchError::TableNotFound(table.fqn()))?;

        let schema = metadata
            .columns
            .iter()
            .map(|c| FieldSchema {
                name: c.name.clone(),
                field_type: c.data_type.clone(),
            })
            .collect();

        let row_count = metadata.num_rows.unwrap_or(0).max(0) as u64;
        let rows = (0..row_count.min(u64::from(limit)))
            .map(|i| {
                metadata
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), serde_json::Value::from(format!("{}_{}", c.name, i))))
                    .collect()
            })
            .collect();

        Ok(QueryResult {
            schema,
            rows,
            total_bytes_processed: Some(0),
        })
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResult, FetchError> {
        let _guard = self.enter("run_query").await?;

        self.query_results
            .read()
            .await
            .get(sql)
            .cloned()
            .ok_or_else(|| FetchError::QueryError(format!("No canned result for query: {}", sql)))
    }

    async fn lineage_references(&self, query: &ReferenceQuery) -> Result<Vec<TableIdentifier>, FetchError> {
        let _guard = self.enter("lineage_references").await?;
        self.check_table(&query.table).await?;

        Ok(query.evaluate(&self.jobs.read().await, Utc::now()))
    }

    async fn recent_failures(&self, query: &FailureQuery) -> Result<Vec<JobFailure>, FetchError> {
        let _guard = self.enter("recent_failures").await?;
        self.check_table(&query.table).await?;

        Ok(query.evaluate(&self.jobs.read().await, Utc::now()))
    }

    async fn edge_job(&self, query: &EdgeJobQuery) -> Result<Option<JobRecord>, FetchError> {
        let _guard = self.enter("edge_job").await?;

        Ok(query.evaluate(&self.jobs.read().await, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::ReferenceQuery;
    use crate::types::ColumnInfo;

    fn t(name: &str) -> TableIdentifier {
        TableIdentifier::new("proj", "ds", name)
    }

    #[tokio::test]
    async fn test_mock_adapter_table_not_found() {
        let adapter = MockAdapter::new();
        let result = adapter.fetch_table_metadata(&t("nonexistent")).await;
        assert!(matches!(result, Err(FetchError::TableNotFound(_))));
    }

    #[tokio::test]
    async fn test_mock_adapter_connection_failure() {
        let adapter = MockAdapter::new().with_connection_failure();

        let result = adapter.test_connection().await;
        assert!(matches!(result, Err(FetchError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_mock_adapter_custom_error() {
        let adapter = MockAdapter::new();
        adapter.add_table(TableMetadata::empty(t("restricted"))).await;
        adapter
            .add_error_for_table(
                t("restricted"),
                FetchError::PermissionDenied("Access denied to restricted table".to_string()),
            )
            .await;

        let result = adapter.fetch_table_metadata(&t("restricted")).await;
        assert!(matches!(result, Err(FetchError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn evaluates_lineage_against_job_log() {
        let adapter = MockAdapter::new();
        adapter
            .record_job(write_job("j1", hours_ago(48), "INSERT", t("orders"), vec![t("raw_orders")]))
            .await;

        let sources = adapter
            .lineage_references(&ReferenceQuery::sources_of(t("orders"), 30, 100))
            .await
            .unwrap();
        assert_eq!(sources, vec![t("raw_orders")]);
        assert_eq!(adapter.call_count("lineage_references").await, 1);
    }

    #[tokio::test]
    async fn lists_inventory_from_registered_tables() {
        let adapter = MockAdapter::for_project("proj");
        let mut orders = TableMetadata::empty(t("orders"));
        orders.num_rows = Some(3);
        orders.columns = vec![ColumnInfo::new("id", "INT64").required()];
        adapter.add_table(orders).await;
        adapter.add_table(TableMetadata::empty(TableIdentifier::new("proj", "other", "x"))).await;
        adapter.set_dataset_location("proj", "ds", "US").await;

        let datasets = adapter.list_datasets("proj").await.unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].location.as_deref(), Some("US"));

        let tables = adapter.list_tables("proj", "ds").await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].row_count, Some(3));

        let preview = adapter.preview_rows(&t("orders"), 2).await.unwrap();
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.schema[0].name, "id");
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let adapter = MockAdapter::new();
        adapter.fail_next_calls(1, FetchError::NetworkError("flaky".into())).await;

        assert!(adapter.test_connection().await.is_err());
        assert!(adapter.test_connection().await.is_ok());
        assert_eq!(adapter.call_count("test_connection").await, 2);
    }

    #[tokio::test]
    async fn test_mock_adapter_clone_shares_state() {
        let adapter = MockAdapter::new();
        let cloned = adapter.clone();
        adapter.add_table(TableMetadata::empty(t("shared"))).await;

        assert!(cloned.fetch_table_metadata(&t("shared")).await.is_ok());
    }
}
