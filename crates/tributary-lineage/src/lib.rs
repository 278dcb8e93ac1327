//! Tributary lineage engine
//!
//! - [`LineageBuilder`] reconstructs table-to-table lineage from warehouse
//!   job history, bounded by depth and tolerant of partial failures.
//! - [`RootCauseAnalyzer`] walks a table's upstream graph and ranks the
//!   ancestors most likely to explain a data incident.
//!
//! ## Example
//!
//! ```rust,ignore
//! let builder = LineageBuilder::new(adapter.clone(), config.lineage.clone());
//! let graph = builder.build(&table, Direction::Both, 3).await;
//!
//! let analyzer = RootCauseAnalyzer::new(Arc::new(AdapterProbe::new(adapter)), config.analysis.clone());
//! let report = analyzer.diagnose(&table, &builder).await?;
//! ```

pub mod analyzer;
pub mod builder;
pub mod partial;

pub use analyzer::{
    evaluate, recommend, upstream_ancestors, AdapterProbe, AncestorProbe, RootCauseAnalyzer, RootCauseReport,
    SuspiciousNode, CASCADING_RECOMMENDATION, NO_ISSUES_RECOMMENDATION,
};
pub use builder::{LineageBuilder, LineageProvider};
pub use partial::Partial;
