//! Warehouse access for lineage mining and catalog browsing
//!
//! Adapters expose listings, table metadata, row previews, ad-hoc queries and
//! job-history mining behind one async trait. [`GuardedAdapter`] wraps any
//! adapter with the process-wide concurrency limit, timeout and retry policy.
//!
//! ## Features
//!
//! - `bigquery` - Google BigQuery support
//!
//! ## Example
//!
//! ```rust,ignore
//! use tributary_catalog::{BigQueryAdapter, GuardedAdapter, ReferenceQuery, WarehouseAdapter};
//!
//! let adapter = BigQueryAdapter::with_adc("my-project", "region-us").await?;
//! let adapter = GuardedAdapter::from_config(Arc::new(adapter), &config.warehouse);
//! let parents = adapter
//!     .lineage_references(&ReferenceQuery::sources_of(table, 30, 100))
//!     .await?;
//! ```

pub mod adapter;
pub mod bigquery;
pub mod guard;
pub mod jobs;
pub mod mock;
pub mod retry;
pub mod types;

pub use adapter::{FetchError, WarehouseAdapter};
pub use bigquery::BigQueryAdapter;
pub use guard::GuardedAdapter;
pub use jobs::{EdgeJobQuery, FailureQuery, ReferenceQuery, ReferenceSide};
pub use mock::MockAdapter;
pub use retry::RetryPolicy;
pub use tributary_core::TableIdentifier;
pub use types::{
    ColumnInfo, DatasetInfo, FieldSchema, JobError, JobFailure, JobRecord, Partitioning, QueryResult,
    TableMetadata, TableSummary,
};
