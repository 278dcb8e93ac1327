//! Request and response bodies of the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tributary_catalog::{FieldSchema, JobRecord, TableMetadata, TableSummary};
use tributary_core::{Freshness, NodeKind, TableIdentifier};

/// USD per TiB scanned
pub const PRICE_PER_TIB_USD: f64 = 5.0;

/// On-demand cost of scanning `bytes`
pub fn estimated_cost_usd(bytes: i64) -> f64 {
    bytes.max(0) as f64 / (1u64 << 40) as f64 * PRICE_PER_TIB_USD
}

/// Primary key guess: first column named like an id or a `_key`
pub fn guess_primary_key<'a>(columns: impl IntoIterator<Item = &'a str>) -> Option<String> {
    columns
        .into_iter()
        .find(|name| {
            let lower = name.to_lowercase();
            lower.contains("id") || lower.ends_with("_key")
        })
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

// =============================================================================
// Schema browser
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub datasets: Vec<SchemaDataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDataset {
    pub name: String,
    pub tables: Vec<SchemaTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(rename = "primaryKey")]
    pub primary_key: Option<String>,
    pub row_count: Option<i64>,
}

impl From<&TableMetadata> for SchemaTable {
    fn from(metadata: &TableMetadata) -> Self {
        let columns: Vec<String> = metadata.columns.iter().map(|c| c.name.clone()).collect();
        Self {
            name: metadata.table.table.clone(),
            primary_key: guess_primary_key(columns.iter().map(String::as_str)),
            columns,
            row_count: metadata.num_rows,
        }
    }
}

// =============================================================================
// Ad-hoc queries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub schema: Vec<FieldSchema>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub total_rows: usize,
}

// =============================================================================
// Asset inventory
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsResponse {
    pub projects: Vec<ProjectAssets>,
    pub total_projects: usize,
    pub total_datasets: usize,
    pub total_assets: usize,
}

impl AssetsResponse {
    pub fn new(projects: Vec<ProjectAssets>) -> Self {
        let total_datasets = projects.iter().map(|p| p.datasets.len()).sum();
        let total_assets = projects
            .iter()
            .flat_map(|p| &p.datasets)
            .map(|d| d.assets.len())
            .sum();
        Self {
            total_projects: projects.len(),
            total_datasets,
            total_assets,
            projects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAssets {
    pub id: String,
    pub name: String,
    pub datasets: Vec<DatasetAssets>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetAssets {
    pub name: String,
    pub location: Option<String>,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub row_count: Option<i64>,
    pub size_bytes: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub creation_time: Option<DateTime<Utc>>,
}

impl From<TableSummary> for Asset {
    fn from(summary: TableSummary) -> Self {
        Self {
            name: summary.table_id,
            kind: summary.kind,
            row_count: summary.row_count,
            size_bytes: summary.size_bytes,
            last_modified: summary.modified_at,
            creation_time: summary.created_at,
        }
    }
}

// =============================================================================
// Table detail
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadataResponse {
    #[serde(flatten)]
    pub metadata: TableMetadata,
    pub freshness: Option<Freshness>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub table: TableIdentifier,
    pub schema: Vec<FieldSchema>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub total_rows: usize,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeQueryResponse {
    pub source: String,
    pub target: String,
    pub job_id: String,
    pub creation_time: DateTime<Utc>,
    pub statement_type: String,
    pub user_email: Option<String>,
    pub query: String,
    pub total_bytes_processed: Option<i64>,
    pub estimated_cost_usd: f64,
}

impl EdgeQueryResponse {
    pub fn from_job(source: &TableIdentifier, target: &TableIdentifier, job: JobRecord) -> Self {
        Self {
            source: source.fqn(),
            target: target.fqn(),
            estimated_cost_usd: estimated_cost_usd(job.total_bytes_processed.unwrap_or(0)),
            job_id: job.job_id,
            creation_time: job.creation_time,
            statement_type: job.statement_type,
            user_email: job.user_email,
            query: job.query,
            total_bytes_processed: job.total_bytes_processed,
        }
    }
}

// =============================================================================
// Cache administration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub status: String,
    pub cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInvalidateResponse {
    pub status: String,
    pub pattern: String,
    pub deleted: u64,
}
