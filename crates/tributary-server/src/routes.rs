//! HTTP routes
//!
//! Thin handlers: extract, call [`CatalogService`], wrap in JSON.

use axum::{
    extract::{Path, Query, State},
    http::HeaderValue,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tributary_cache::{CacheStats, Cached};
use tributary_core::{LineageGraph, TableIdentifier};
use tributary_lineage::RootCauseReport;

use crate::error::ApiResult;
use crate::payload::{
    AssetsResponse, CacheClearResponse, CacheInvalidateResponse, EdgeQueryResponse, ExecuteRequest,
    ExecuteResponse, HealthResponse, PreviewResponse, SchemaResponse, TableMetadataResponse,
};
use crate::service::CatalogService;

/// Application state shared across handlers
pub struct AppState {
    pub service: CatalogService,
}

impl AppState {
    pub fn new(service: CatalogService) -> Self {
        Self { service }
    }
}

type SharedState = State<Arc<AppState>>;

/// Build the axum router with all routes
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.service.config().server.cors_origins);

    Router::new()
        .route("/health", get(health))
        // Catalog
        .route("/api/bigquery/schema", get(schema))
        .route("/api/bigquery/execute", post(execute))
        .route("/api/bigquery/assets", get(assets))
        .route(
            "/api/bigquery/table-metadata/{project}/{dataset}/{table}",
            get(table_metadata),
        )
        .route(
            "/api/bigquery/table-preview/{project}/{dataset}/{table}",
            get(table_preview),
        )
        // Lineage
        .route("/api/bigquery/lineage/{project}/{dataset}/{table}", get(lineage))
        .route("/api/bigquery/edge-query/{source}/{target}", get(edge_query))
        .route("/api/bigquery/root-cause/{project}/{dataset}/{table}", get(root_cause))
        // Cache administration
        .route("/api/cache/clear", delete(cache_clear))
        .route("/api/cache/clear/{pattern}", delete(cache_invalidate))
        .route("/api/cache/stats", get(cache_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Any origin when unconfigured or `*` is listed, otherwise the listed ones
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(allowed)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct PreviewParams {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LineageParams {
    direction: Option<String>,
    depth: Option<u32>,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// GET /api/bigquery/schema
async fn schema(State(state): SharedState) -> ApiResult<Json<Cached<SchemaResponse>>> {
    Ok(Json(state.service.schema().await?))
}

/// POST /api/bigquery/execute
async fn execute(
    State(state): SharedState,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<Json<Cached<ExecuteResponse>>> {
    Ok(Json(state.service.execute(&req.query).await?))
}

/// GET /api/bigquery/assets
async fn assets(State(state): SharedState) -> ApiResult<Json<Cached<AssetsResponse>>> {
    Ok(Json(state.service.assets().await?))
}

async fn table_metadata(
    State(state): SharedState,
    Path((project, dataset, table)): Path<(String, String, String)>,
) -> ApiResult<Json<Cached<TableMetadataResponse>>> {
    let table = TableIdentifier::new(project, dataset, table);
    Ok(Json(state.service.table_metadata(&table).await?))
}

async fn table_preview(
    State(state): SharedState,
    Path((project, dataset, table)): Path<(String, String, String)>,
    Query(params): Query<PreviewParams>,
) -> ApiResult<Json<Cached<PreviewResponse>>> {
    let table = TableIdentifier::new(project, dataset, table);
    Ok(Json(state.service.preview(&table, params.limit).await?))
}

/// GET /api/bigquery/lineage/{project}/{dataset}/{table}?direction=&depth=
async fn lineage(
    State(state): SharedState,
    Path((project, dataset, table)): Path<(String, String, String)>,
    Query(params): Query<LineageParams>,
) -> ApiResult<Json<Cached<LineageGraph>>> {
    let table = TableIdentifier::new(project, dataset, table);
    let graph = state
        .service
        .lineage(&table, params.direction.as_deref(), params.depth)
        .await?;
    Ok(Json(graph))
}

/// GET /api/bigquery/edge-query/{source}/{target}
async fn edge_query(
    State(state): SharedState,
    Path((source, target)): Path<(String, String)>,
) -> ApiResult<Json<Cached<EdgeQueryResponse>>> {
    Ok(Json(state.service.edge_query(&source, &target).await?))
}

async fn root_cause(
    State(state): SharedState,
    Path((project, dataset, table)): Path<(String, String, String)>,
) -> ApiResult<Json<RootCauseReport>> {
    let table = TableIdentifier::new(project, dataset, table);
    Ok(Json(state.service.root_cause(&table).await?))
}

/// DELETE /api/cache/clear
async fn cache_clear(State(state): SharedState) -> Json<CacheClearResponse> {
    Json(state.service.cache_clear().await)
}

/// DELETE /api/cache/clear/{pattern}
async fn cache_invalidate(
    State(state): SharedState,
    Path(pattern): Path<String>,
) -> ApiResult<Json<CacheInvalidateResponse>> {
    Ok(Json(state.service.cache_invalidate(&pattern).await?))
}

async fn cache_stats(State(state): SharedState) -> Json<CacheStats> {
    Json(state.service.cache_stats().await)
}

