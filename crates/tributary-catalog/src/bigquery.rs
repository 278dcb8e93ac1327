//! BigQuery warehouse adapter
//!
//! Everything is read through SQL: `__TABLES__` for sizes and timestamps,
//! `INFORMATION_SCHEMA.COLUMNS`/`TABLES`/`VIEWS` for structure, and the
//! regional `INFORMATION_SCHEMA.JOBS_BY_PROJECT` view for job history.
//! Required IAM permissions:
//! - bigquery.jobs.create
//! - bigquery.jobs.listAll (for JOBS_BY_PROJECT)
//! - bigquery.tables.get / bigquery.tables.getData
//!
//! ## Authentication
//!
//! 1. Service account JSON file (explicit path)
//! 2. Service account JSON content (inline)
//! 3. Application Default Credentials (ADC)
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter = BigQueryAdapter::with_adc("my-project", "region-us").await?;
//! let meta = adapter.fetch_table_metadata(&TableIdentifier::new("p", "d", "t")).await?;
//! ```
//!
//! Row values come back from the REST API as JSON, with 64-bit integers
//! encoded as strings. The parsing helpers below accept either form so they
//! can be exercised without the `bigquery` feature.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
#[cfg(feature = "bigquery")]
use std::time::Instant;
use tributary_core::{NodeKind, TableIdentifier};

use crate::adapter::{FetchError, WarehouseAdapter};
use crate::jobs::{EdgeJobQuery, FailureQuery, ReferenceQuery};
#[cfg(any(feature = "bigquery", test))]
use crate::types::FieldSchema;
use crate::types::{
    ColumnInfo, DatasetInfo, JobFailure, JobRecord, Partitioning, QueryResult, TableMetadata, TableSummary,
};

#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{model::query_request::QueryRequest, Client as BigQueryClient};

const NOT_COMPILED: &str = "BigQuery support not compiled. Rebuild with: cargo build --features bigquery";

/// Server-side wait per `jobs.query` / `getQueryResults` call
#[cfg(feature = "bigquery")]
const POLL_WAIT_MS: i32 = 10_000;

#[cfg(feature = "bigquery")]
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

type Row = Map<String, Value>;

/// BigQuery warehouse adapter
pub struct BigQueryAdapter {
    /// Billing project
    project_id: String,

    /// Region qualifier, e.g. `region-us`
    location: String,

    /// Upper bound on waiting for one job, paging included
    max_wait: Duration,

    /// BigQuery client (only available with bigquery feature)
    #[cfg(feature = "bigquery")]
    client: BigQueryClient,
}

impl BigQueryAdapter {
    /// Create a new BigQuery adapter using Application Default Credentials (ADC)
    ///
    /// ADC automatically detects credentials from:
    /// - GOOGLE_APPLICATION_CREDENTIALS environment variable
    /// - gcloud CLI default credentials
    /// - GCE/GKE metadata service
    #[cfg(feature = "bigquery")]
    pub async fn with_adc(project_id: impl Into<String>, location: impl Into<String>) -> Result<Self, FetchError> {
        let client = BigQueryClient::from_application_default_credentials()
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to authenticate with ADC: {}. \
                 Ensure GOOGLE_APPLICATION_CREDENTIALS is set or run 'gcloud auth application-default login'",
                e
            )))?;

        Ok(Self {
            project_id: project_id.into(),
            location: location.into(),
            max_wait: DEFAULT_MAX_WAIT,
            client,
        })
    }

    /// Create adapter without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn with_adc(project_id: impl Into<String>, location: impl Into<String>) -> Result<Self, FetchError> {
        let _ = (project_id.into(), location.into());
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create a new BigQuery adapter using a service account key file
    #[cfg(feature = "bigquery")]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        location: impl Into<String>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, FetchError> {
        let key_path_str = key_path.as_ref().to_string_lossy().to_string();

        let client = BigQueryClient::from_service_account_key_file(&key_path_str)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to read service account key file '{}': {}",
                key_path_str, e
            )))?;

        Ok(Self {
            project_id: project_id.into(),
            location: location.into(),
            max_wait: DEFAULT_MAX_WAIT,
            client,
        })
    }

    /// Create adapter without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        location: impl Into<String>,
        _key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, FetchError> {
        let _ = (project_id.into(), location.into());
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create a new BigQuery adapter using service account JSON content
    #[cfg(feature = "bigquery")]
    pub async fn from_service_account_json(
        project_id: impl Into<String>,
        location: impl Into<String>,
        key_json: &str,
    ) -> Result<Self, FetchError> {
        let sa_key: gcp_bigquery_client::yup_oauth2::ServiceAccountKey =
            serde_json::from_str(key_json)
                .map_err(|e| FetchError::ConfigError(format!(
                    "Failed to parse service account JSON: {}",
                    e
                )))?;

        let client = BigQueryClient::from_service_account_key(sa_key, false)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to authenticate with service account: {}",
                e
            )))?;

        Ok(Self {
            project_id: project_id.into(),
            location: location.into(),
            max_wait: DEFAULT_MAX_WAIT,
            client,
        })
    }

    /// Create adapter without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn from_service_account_json(
        project_id: impl Into<String>,
        location: impl Into<String>,
        _key_json: &str,
    ) -> Result<Self, FetchError> {
        let _ = (project_id.into(), location.into());
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Give up on a job that has not finished after `max_wait`
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Run SQL and collect every row, keyed by column name
    ///
    /// `jobs.query` answers with `jobComplete = false` when the job outlives
    /// the server-side wait, and with a `pageToken` when the result spans
    /// several pages. Both cases continue through `getQueryResults` until
    /// the job is done and the last page is read.
    #[cfg(feature = "bigquery")]
    async fn execute(&self, sql: &str, subject: &str) -> Result<QueryResult, FetchError> {
        use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;

        tracing::debug!(subject, "submitting BigQuery job");
        let deadline = Instant::now() + self.max_wait;

        let mut request = QueryRequest::new(sql.to_string());
        request.timeout_ms = Some(POLL_WAIT_MS);
        let first = self
            .client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| FetchError::from_message(e.to_string(), subject))?;

        let mut pages = Pages::default();
        let complete = first.job_complete.unwrap_or(false);
        if complete {
            pages.push(
                first.schema.as_ref().map(field_schema).unwrap_or_default(),
                first.rows.map(cells).unwrap_or_default(),
                first.total_bytes_processed.as_deref(),
            );
        }
        let mut page_token = first.page_token;
        if complete && page_token.is_none() {
            return Ok(pages.finish());
        }

        let job = first.job_reference.unwrap_or_default();
        let job_id = job.job_id.ok_or_else(|| {
            FetchError::InvalidResponse(format!("BigQuery returned no job id for {}", subject))
        })?;

        loop {
            if Instant::now() >= deadline {
                tracing::warn!(subject, job_id = %job_id, "BigQuery job did not finish in time");
                return Err(FetchError::Timeout(self.max_wait.as_secs()));
            }

            let params = GetQueryResultsParameters {
                location: job.location.clone(),
                page_token: page_token.clone(),
                timeout_ms: Some(POLL_WAIT_MS),
                ..Default::default()
            };
            let page = self
                .client
                .job()
                .get_query_results(&self.project_id, &job_id, params)
                .await
                .map_err(|e| FetchError::from_message(e.to_string(), subject))?;

            if !page.job_complete.unwrap_or(false) {
                tracing::debug!(subject, job_id = %job_id, "BigQuery job still running");
                continue;
            }

            pages.push(
                page.schema.as_ref().map(field_schema).unwrap_or_default(),
                page.rows.map(cells).unwrap_or_default(),
                page.total_bytes_processed.as_deref(),
            );
            page_token = page.page_token;
            if page_token.is_none() {
                return Ok(pages.finish());
            }
        }
    }

    #[cfg(not(feature = "bigquery"))]
    async fn execute(&self, _sql: &str, _subject: &str) -> Result<QueryResult, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}

// =============================================================================
// Row parsing
// =============================================================================

/// Rows accumulated across result pages
#[cfg(any(feature = "bigquery", test))]
#[derive(Debug, Default)]
struct Pages {
    schema: Vec<FieldSchema>,
    rows: Vec<Row>,
    total_bytes_processed: Option<i64>,
}

#[cfg(any(feature = "bigquery", test))]
impl Pages {
    /// Add one page of positional cells; the first non-empty schema wins
    fn push(&mut self, schema: Vec<FieldSchema>, cells: Vec<Vec<Value>>, total_bytes: Option<&str>) {
        if self.schema.is_empty() {
            self.schema = schema;
        }
        if self.total_bytes_processed.is_none() {
            self.total_bytes_processed = total_bytes.and_then(|b| b.parse().ok());
        }
        let schema = &self.schema;
        self.rows.extend(cells.into_iter().map(|row| {
            schema
                .iter()
                .zip(row.into_iter().chain(std::iter::repeat(Value::Null)))
                .map(|(field, value)| (field.name.clone(), value))
                .collect::<Row>()
        }));
    }

    fn finish(self) -> QueryResult {
        QueryResult {
            schema: self.schema,
            rows: self.rows,
            total_bytes_processed: self.total_bytes_processed,
        }
    }
}

#[cfg(feature = "bigquery")]
fn field_schema(schema: &gcp_bigquery_client::model::table_schema::TableSchema) -> Vec<FieldSchema> {
    schema
        .fields
        .as_ref()
        .map(|fields| {
            fields
                .iter()
                .map(|f| FieldSchema {
                    name: f.name.clone(),
                    field_type: format!("{:?}", f.r#type),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(feature = "bigquery")]
fn cells(rows: Vec<gcp_bigquery_client::model::table_row::TableRow>) -> Vec<Vec<Value>> {
    rows.into_iter()
        .map(|row| {
            row.columns
                .unwrap_or_default()
                .into_iter()
                .map(|cell| cell.value.unwrap_or(Value::Null))
                .collect()
        })
        .collect()
}

fn opt_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn req_str(row: &Row, column: &str) -> Result<String, FetchError> {
    opt_str(row, column)
        .ok_or_else(|| FetchError::InvalidResponse(format!("Missing column {}", column)))
}

fn opt_i64(row: &Row, column: &str) -> Option<i64> {
    match row.get(column) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

fn opt_millis(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    opt_i64(row, column).and_then(DateTime::from_timestamp_millis)
}

fn is_yes(row: &Row, column: &str) -> bool {
    opt_str(row, column)
        .map(|v| v.eq_ignore_ascii_case("YES") || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// `__TABLES__.type`: 1 = table, 2 = view, 3 = external
fn kind_from_code(code: Option<i64>) -> NodeKind {
    match code {
        Some(2) => NodeKind::View,
        Some(3) => NodeKind::External,
        _ => NodeKind::Table,
    }
}

pub(crate) fn parse_table_identifier(row: &Row) -> Result<Option<TableIdentifier>, FetchError> {
    // Jobs without a destination or with anonymous references yield nulls
    let Some(table) = opt_str(row, "table_id") else {
        return Ok(None);
    };
    Ok(Some(TableIdentifier::new(
        req_str(row, "project_id")?,
        req_str(row, "dataset_id")?,
        table,
    )))
}

pub(crate) fn parse_table_summary(row: &Row) -> Result<TableSummary, FetchError> {
    Ok(TableSummary {
        table_id: req_str(row, "table_id")?,
        kind: kind_from_code(opt_i64(row, "type")),
        row_count: opt_i64(row, "row_count"),
        size_bytes: opt_i64(row, "size_bytes"),
        created_at: opt_millis(row, "creation_time"),
        modified_at: opt_millis(row, "last_modified_time"),
    })
}

pub(crate) fn parse_column(row: &Row) -> Result<ColumnInfo, FetchError> {
    Ok(ColumnInfo {
        name: req_str(row, "column_name")?,
        data_type: opt_str(row, "data_type").unwrap_or_else(|| "UNKNOWN".to_string()),
        nullable: opt_str(row, "is_nullable")
            .map(|v| !v.eq_ignore_ascii_case("NO"))
            .unwrap_or(true),
        description: opt_str(row, "description"),
    })
}

pub(crate) fn parse_failure(row: &Row) -> Result<JobFailure, FetchError> {
    Ok(JobFailure {
        job_id: req_str(row, "job_id")?,
        creation_time: opt_millis(row, "creation_ms")
            .ok_or_else(|| FetchError::InvalidResponse("Missing column creation_ms".to_string()))?,
        error_reason: opt_str(row, "error_reason"),
        error_message: opt_str(row, "error_message"),
    })
}

pub(crate) fn parse_edge_job(row: &Row, query: &EdgeJobQuery) -> Result<JobRecord, FetchError> {
    Ok(JobRecord {
        job_id: req_str(row, "job_id")?,
        creation_time: opt_millis(row, "creation_ms")
            .ok_or_else(|| FetchError::InvalidResponse("Missing column creation_ms".to_string()))?,
        statement_type: opt_str(row, "statement_type").unwrap_or_default(),
        destination: Some(query.target.clone()),
        referenced_tables: vec![query.source.clone()],
        query: opt_str(row, "query").unwrap_or_default(),
        user_email: opt_str(row, "user_email"),
        total_bytes_processed: opt_i64(row, "total_bytes_processed"),
        error: None,
    })
}

/// Column structure from `COLUMNS`, descriptions from `COLUMN_FIELD_PATHS`
///
/// Only the top-level path of each column is joined, so nested RECORD
/// fields do not duplicate rows.
pub(crate) fn columns_sql(table: &TableIdentifier) -> String {
    format!(
        r#"
        SELECT
            c.column_name,
            c.data_type,
            c.is_nullable,
            c.is_partitioning_column,
            c.clustering_ordinal_position,
            p.description
        FROM `{project}.{dataset}.INFORMATION_SCHEMA.COLUMNS` AS c
        LEFT JOIN `{project}.{dataset}.INFORMATION_SCHEMA.COLUMN_FIELD_PATHS` AS p
            ON p.table_name = c.table_name
            AND p.column_name = c.column_name
            AND p.field_path = c.column_name
        WHERE c.table_name = '{table}'
        ORDER BY c.ordinal_position
        "#,
        project = table.project,
        dataset = table.dataset,
        table = table.table
    )
}

/// Fold COLUMNS rows into partitioning and clustering details
pub(crate) fn partitioning_and_clustering(rows: &[Row]) -> (Option<Partitioning>, Vec<String>) {
    let partitioning = rows
        .iter()
        .find(|row| is_yes(row, "is_partitioning_column"))
        .map(|row| Partitioning {
            column: opt_str(row, "column_name"),
            data_type: opt_str(row, "data_type"),
        });

    let mut clustered: Vec<(i64, String)> = rows
        .iter()
        .filter_map(|row| {
            let position = opt_i64(row, "clustering_ordinal_position")?;
            Some((position, opt_str(row, "column_name")?))
        })
        .collect();
    clustered.sort();

    (partitioning, clustered.into_iter().map(|(_, name)| name).collect())
}

#[async_trait::async_trait]
impl WarehouseAdapter for BigQueryAdapter {
    fn name(&self) -> &'static str {
        "BigQuery"
    }

    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.execute("SELECT 1", "connection test")
            .await
            .map_err(|e| match e {
                FetchError::ConfigError(msg) => FetchError::ConfigError(msg),
                other => FetchError::QueryError(format!("Connection test failed: {}", other)),
            })?;
        Ok(())
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<DatasetInfo>, FetchError> {
        let sql = format!(
            "SELECT schema_name, location FROM `{}`.`{}`.INFORMATION_SCHEMA.SCHEMATA ORDER BY schema_name",
            project, self.location
        );
        let result = self.execute(&sql, project).await?;

        result
            .rows
            .iter()
            .map(|row| {
                Ok(DatasetInfo {
                    dataset_id: req_str(row, "schema_name")?,
                    location: opt_str(row, "location"),
                })
            })
            .collect()
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<TableSummary>, FetchError> {
        let sql = format!(
            "SELECT table_id, type, row_count, size_bytes, creation_time, last_modified_time \
             FROM `{}.{}.__TABLES__` ORDER BY table_id",
            project, dataset
        );
        let result = self.execute(&sql, &format!("{}.{}", project, dataset)).await?;
        result.rows.iter().map(parse_table_summary).collect()
    }

    async fn fetch_table_metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, FetchError> {
        let summary_sql = format!(
            "SELECT table_id, type, row_count, size_bytes, creation_time, last_modified_time \
             FROM `{}.{}.__TABLES__` WHERE table_id = '{}'",
            table.project, table.dataset, table.table
        );
        let summary = self.execute(&summary_sql, &table.fqn()).await?;
        let summary = summary
            .rows
            .first()
            .map(parse_table_summary)
            .transpose()?
            .ok_or_else(|| FetchError::TableNotFound(table.fqn()))?;

        let columns_sql = columns_sql(table);
        let column_rows = self.execute(&columns_sql, &table.fqn()).await?.rows;
        let columns = column_rows.iter().map(parse_column).collect::<Result<Vec<_>, _>>()?;
        let (partitioning, clustering) = partitioning_and_clustering(&column_rows);

        let type_sql = format!(
            "SELECT table_type FROM `{}.{}.INFORMATION_SCHEMA.TABLES` WHERE table_name = '{}'",
            table.project, table.dataset, table.table
        );
        let kind = self
            .execute(&type_sql, &table.fqn())
            .await?
            .rows
            .first()
            .and_then(|row| opt_str(row, "table_type"))
            .map(|t| NodeKind::from_table_type(&t))
            .unwrap_or(summary.kind);

        let view_definition = if matches!(kind, NodeKind::View | NodeKind::MaterializedView) {
            let view_sql = format!(
                "SELECT view_definition FROM `{}.{}.INFORMATION_SCHEMA.VIEWS` WHERE table_name = '{}'",
                table.project, table.dataset, table.table
            );
            self.execute(&view_sql, &table.fqn())
                .await?
                .rows
                .first()
                .and_then(|row| opt_str(row, "view_definition"))
        } else {
            None
        };

        Ok(TableMetadata {
            table: table.clone(),
            kind,
            num_rows: summary.row_count,
            num_bytes: summary.size_bytes,
            created_at: summary.created_at,
            modified_at: summary.modified_at,
            columns,
            partitioning,
            clustering,
            view_definition,
        })
    }

    async fn preview_rows(&self, table: &TableIdentifier, limit: u32) -> Result<QueryResult, FetchError> {
        let sql = format!("SELECT * FROM `{}` LIMIT {}", table.fqn(), limit);
        self.execute(&sql, &table.fqn()).await
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResult, FetchError> {
        self.execute(sql, "query").await
    }

    async fn lineage_references(&self, query: &ReferenceQuery) -> Result<Vec<TableIdentifier>, FetchError> {
        let result = self
            .execute(&query.to_sql(&self.location), &query.table.fqn())
            .await?;

        let mut tables = Vec::new();
        for row in &result.rows {
            if let Some(table) = parse_table_identifier(row)? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    async fn recent_failures(&self, query: &FailureQuery) -> Result<Vec<JobFailure>, FetchError> {
        let result = self
            .execute(&query.to_sql(&self.location), &query.table.fqn())
            .await?;
        result.rows.iter().map(parse_failure).collect()
    }

    async fn edge_job(&self, query: &EdgeJobQuery) -> Result<Option<JobRecord>, FetchError> {
        let subject = format!("{} -> {}", query.source, query.target);
        let result = self.execute(&query.to_sql(&self.location), &subject).await?;
        result.rows.first().map(|row| parse_edge_job(row, query)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_string_encoded_integers() {
        let r = row(json!({
            "table_id": "orders",
            "type": "1",
            "row_count": "1000",
            "size_bytes": 2048,
            "creation_time": "1700000000000",
            "last_modified_time": "1700003600000"
        }));

        let summary = parse_table_summary(&r).unwrap();
        assert_eq!(summary.table_id, "orders");
        assert_eq!(summary.kind, NodeKind::Table);
        assert_eq!(summary.row_count, Some(1000));
        assert_eq!(summary.size_bytes, Some(2048));
        assert_eq!(summary.created_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(summary.modified_at.unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn view_type_code_maps_to_view() {
        let r = row(json!({"table_id": "v", "type": 2}));
        assert_eq!(parse_table_summary(&r).unwrap().kind, NodeKind::View);
    }

    #[test]
    fn null_reference_rows_are_skipped() {
        let anonymous = row(json!({"project_id": "p", "dataset_id": "_script", "table_id": null}));
        assert!(parse_table_identifier(&anonymous).unwrap().is_none());

        let named = row(json!({"project_id": "p", "dataset_id": "d", "table_id": "t"}));
        assert_eq!(
            parse_table_identifier(&named).unwrap(),
            Some(TableIdentifier::new("p", "d", "t"))
        );

        let broken = row(json!({"table_id": "t"}));
        assert!(matches!(parse_table_identifier(&broken), Err(FetchError::InvalidResponse(_))));
    }

    #[test]
    fn folds_partitioning_and_clustering() {
        let rows = vec![
            row(json!({"column_name": "id", "data_type": "INT64", "is_nullable": "NO",
                       "is_partitioning_column": "NO", "clustering_ordinal_position": "2"})),
            row(json!({"column_name": "event_date", "data_type": "DATE", "is_nullable": "YES",
                       "is_partitioning_column": "YES", "clustering_ordinal_position": null})),
            row(json!({"column_name": "customer", "data_type": "STRING", "is_nullable": "YES",
                       "is_partitioning_column": "NO", "clustering_ordinal_position": "1"})),
        ];

        let (partitioning, clustering) = partitioning_and_clustering(&rows);
        assert_eq!(partitioning.unwrap().column.as_deref(), Some("event_date"));
        assert_eq!(clustering, vec!["customer".to_string(), "id".to_string()]);

        let id = parse_column(&rows[0]).unwrap();
        assert!(!id.nullable);
        assert_eq!(id.data_type, "INT64");
    }

    #[test]
    fn parses_failures_and_edge_jobs() {
        let failure = parse_failure(&row(json!({
            "job_id": "job_1",
            "creation_ms": "1700000000000",
            "error_reason": "invalidQuery",
            "error_message": "Syntax error"
        })))
        .unwrap();
        assert_eq!(failure.error_reason.as_deref(), Some("invalidQuery"));

        let query = EdgeJobQuery::new(
            TableIdentifier::new("p", "d", "raw"),
            TableIdentifier::new("p", "d", "orders"),
            30,
        );
        let job = parse_edge_job(
            &row(json!({
                "job_id": "job_2",
                "creation_ms": 1700000000000i64,
                "statement_type": "MERGE",
                "query": "MERGE d.orders USING d.raw",
                "total_bytes_processed": "1099511627776"
            })),
            &query,
        )
        .unwrap();
        assert_eq!(job.total_bytes_processed, Some(1_099_511_627_776));
        assert_eq!(job.destination, Some(query.target.clone()));
    }

    #[test]
    fn column_descriptions_come_from_field_paths() {
        let sql = columns_sql(&TableIdentifier::new("p", "d", "orders"));
        assert!(sql.contains("`p.d.INFORMATION_SCHEMA.COLUMN_FIELD_PATHS`"));
        assert!(sql.contains("p.description"));
        assert!(sql.contains("WHERE c.table_name = 'orders'"));

        let column = parse_column(&row(json!({
            "column_name": "amount",
            "data_type": "NUMERIC",
            "is_nullable": "YES",
            "description": "Order total in USD"
        })))
        .unwrap();
        assert_eq!(column.description.as_deref(), Some("Order total in USD"));
    }

    fn fields(names: &[&str]) -> Vec<FieldSchema> {
        names
            .iter()
            .map(|name| FieldSchema {
                name: name.to_string(),
                field_type: "STRING".to_string(),
            })
            .collect()
    }

    #[test]
    fn pages_accumulate_every_row() {
        let mut pages = Pages::default();
        pages.push(
            fields(&["job_id", "table_id"]),
            vec![vec![json!("j1"), json!("orders")], vec![json!("j2"), json!("raw")]],
            Some("1024"),
        );
        // later pages repeat the schema and byte count
        pages.push(
            fields(&["job_id", "table_id"]),
            vec![vec![json!("j3"), json!("revenue")]],
            Some("1024"),
        );

        let result = pages.finish();
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[2].get("table_id"), Some(&json!("revenue")));
        assert_eq!(result.total_bytes_processed, Some(1024));
        assert_eq!(result.schema.len(), 2);
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let mut pages = Pages::default();
        // an unfinished job reports neither schema nor rows
        pages.push(Vec::new(), Vec::new(), None);
        pages.push(fields(&["job_id", "error_reason"]), vec![vec![json!("j1")]], None);

        let result = pages.finish();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("error_reason"), Some(&Value::Null));
        assert_eq!(result.total_bytes_processed, None);
    }

    #[tokio::test]
    #[cfg(not(feature = "bigquery"))]
    async fn constructors_fail_without_feature() {
        let result = BigQueryAdapter::with_adc("my-project", "region-us").await;
        assert!(matches!(result, Err(FetchError::ConfigError(_))));
    }
}
