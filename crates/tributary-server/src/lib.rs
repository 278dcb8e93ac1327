//! Tributary HTTP service
//!
//! Exposes catalog browsing, lineage, edge provenance and root-cause
//! analysis over JSON, with cache-aside caching in front of the warehouse.

pub mod app;
pub mod cached;
pub mod error;
pub mod payload;
pub mod routes;
pub mod service;

pub use app::{build_service, connect_warehouse, serve};
pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};
pub use service::CatalogService;
