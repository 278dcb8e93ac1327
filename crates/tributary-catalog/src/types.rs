//! Typed records returned by warehouse adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tributary_core::{NodeKind, TableIdentifier};

/// A dataset in a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub dataset_id: String,
    pub location: Option<String>,
}

/// Inventory row for a table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub table_id: String,
    pub kind: NodeKind,
    pub row_count: Option<i64>,
    pub size_bytes: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// A column as reported by INFORMATION_SCHEMA.COLUMNS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Time partitioning of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partitioning {
    /// Partitioning column; `None` means ingestion-time partitioning
    pub column: Option<String>,
    pub data_type: Option<String>,
}

/// Detailed metadata for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub table: TableIdentifier,
    pub kind: NodeKind,
    pub num_rows: Option<i64>,
    pub num_bytes: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub columns: Vec<ColumnInfo>,
    pub partitioning: Option<Partitioning>,
    pub clustering: Vec<String>,
    pub view_definition: Option<String>,
}

impl TableMetadata {
    /// Metadata with no columns or timestamps
    pub fn empty(table: TableIdentifier) -> Self {
        Self {
            table,
            kind: NodeKind::Table,
            num_rows: None,
            num_bytes: None,
            created_at: None,
            modified_at: None,
            columns: Vec::new(),
            partitioning: None,
            clustering: Vec::new(),
            view_definition: None,
        }
    }
}

/// Name and type of a result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Rows returned by a query, keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub schema: Vec<FieldSchema>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub total_bytes_processed: Option<i64>,
}

/// A historical query job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub creation_time: DateTime<Utc>,
    pub statement_type: String,
    pub destination: Option<TableIdentifier>,
    pub referenced_tables: Vec<TableIdentifier>,
    pub query: String,
    pub user_email: Option<String>,
    pub total_bytes_processed: Option<i64>,
    pub error: Option<JobError>,
}

/// Error result attached to a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// A failed job as surfaced in root-cause reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub job_id: String,
    pub creation_time: DateTime<Utc>,
    pub error_reason: Option<String>,
    pub error_message: Option<String>,
}

impl From<&JobRecord> for JobFailure {
    fn from(job: &JobRecord) -> Self {
        let (error_reason, error_message) = job
            .error
            .as_ref()
            .map(|e| (e.reason.clone(), e.message.clone()))
            .unwrap_or((None, None));

        Self {
            job_id: job.job_id.clone(),
            creation_time: job.creation_time,
            error_reason,
            error_message,
        }
    }
}
