//! HTTP API tests
//!
//! Drive the router in-process with a mock warehouse and an in-memory cache.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tributary_cache::{CacheLayer, MemoryStore};
use tributary_catalog::mock::{hours_ago, write_job};
use tributary_catalog::{ColumnInfo, FetchError, FieldSchema, MockAdapter, QueryResult, TableIdentifier, TableMetadata};
use tributary_core::Config;
use tributary_server::{router, AppState, CatalogService};

// ============================================================================
// Test Infrastructure
// ============================================================================

fn t(name: &str) -> TableIdentifier {
    TableIdentifier::new("proj", "ds", name)
}

fn table_meta(name: &str, modified_hours_ago: i64, rows: i64) -> TableMetadata {
    let mut meta = TableMetadata::empty(t(name));
    meta.modified_at = Some(hours_ago(modified_hours_ago));
    meta.num_rows = Some(rows);
    meta.columns = vec![ColumnInfo::new("name", "STRING"), ColumnInfo::new("order_id", "INT64")];
    meta
}

fn memory_cache() -> CacheLayer {
    CacheLayer::new(Arc::new(MemoryStore::new()))
}

fn app(adapter: &MockAdapter, cache: CacheLayer) -> Router {
    let service = CatalogService::new(Arc::new(adapter.clone()), cache, Config::default());
    router(Arc::new(AppState::new(service)))
}

/// orders <- raw_orders, written two days ago
async fn orders_pipeline() -> MockAdapter {
    let adapter = MockAdapter::for_project("proj");
    adapter
        .record_job(write_job("j1", hours_ago(48), "INSERT", t("orders"), vec![t("raw_orders")]))
        .await;
    adapter
}

/// Helper to make HTTP requests to the test app
async fn make_request(app: Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(path)
        .method(method)
        .header("Content-Type", "application/json")
        .body(match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = serde_json::from_slice(&body_bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).to_string()));

    (status, json)
}

fn without_cached(mut value: Value) -> Value {
    if let Some(map) = value.as_object_mut() {
        map.remove("cached");
    }
    value
}

#[tokio::test]
async fn health_reports_healthy() {
    let (status, body) = make_request(app(&MockAdapter::new(), CacheLayer::disabled()), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

// ============================================================================
// Lineage
// ============================================================================

#[tokio::test]
async fn lineage_single_upstream_edge() {
    let adapter = orders_pipeline().await;
    let (status, body) = make_request(
        app(&adapter, memory_cache()),
        "GET",
        "/api/bigquery/lineage/proj/ds/orders?direction=upstream&depth=1",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rootNode"], "proj.ds.orders");
    assert_eq!(body["cached"], false);
    assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(
        body["edges"],
        json!([{ "source": "proj.ds.raw_orders", "target": "proj.ds.orders", "type": "dependency" }])
    );
}

#[tokio::test]
async fn lineage_is_served_from_cache_the_second_time() {
    let adapter = orders_pipeline().await;
    let app = app(&adapter, memory_cache());
    let path = "/api/bigquery/lineage/proj/ds/orders?direction=both&depth=3";

    let (_, first) = make_request(app.clone(), "GET", path, None).await;
    let calls = adapter.call_count("lineage_references").await;
    let (status, second) = make_request(app, "GET", path, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cached"], false);
    assert_eq!(second["cached"], true);
    assert_eq!(without_cached(first), without_cached(second));
    assert_eq!(adapter.call_count("lineage_references").await, calls);
}

#[tokio::test]
async fn lineage_without_cache_still_answers() {
    let adapter = orders_pipeline().await;
    let app = app(&adapter, CacheLayer::disabled());
    let path = "/api/bigquery/lineage/proj/ds/orders";

    let (_, first) = make_request(app.clone(), "GET", path, None).await;
    let (status, second) = make_request(app, "GET", path, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], false);
    assert_eq!(first, second);
}

#[tokio::test]
async fn cached_and_uncached_payloads_match() {
    let adapter = orders_pipeline().await;
    adapter.add_table(table_meta("raw_orders", 48, 1_000)).await;

    for path in [
        "/api/bigquery/lineage/proj/ds/orders?direction=upstream",
        "/api/bigquery/table-preview/proj/ds/raw_orders?limit=5",
        "/api/bigquery/assets",
    ] {
        let (_, without) = make_request(app(&adapter, CacheLayer::disabled()), "GET", path, None).await;
        let with_cache = app(&adapter, memory_cache());
        make_request(with_cache.clone(), "GET", path, None).await;
        let (_, hit) = make_request(with_cache, "GET", path, None).await;

        assert_eq!(hit["cached"], true, "{}", path);
        assert_eq!(without_cached(without), without_cached(hit), "{}", path);
    }
}

#[tokio::test]
async fn lineage_rejects_bad_direction_and_identifier() {
    let adapter = orders_pipeline().await;

    let (status, body) = make_request(
        app(&adapter, CacheLayer::disabled()),
        "GET",
        "/api/bigquery/lineage/proj/ds/orders?direction=sideways",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("sideways"));

    let (status, _) = make_request(
        app(&adapter, CacheLayer::disabled()),
        "GET",
        "/api/bigquery/lineage/proj/ds/bad%20name",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn root_cause_flags_empty_upstream() {
    let adapter = orders_pipeline().await;
    adapter.add_table(table_meta("raw_orders", 48, 0)).await;

    let (status, body) = make_request(
        app(&adapter, memory_cache()),
        "GET",
        "/api/bigquery/root-cause/proj/ds/orders",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzedNodes"], 2);
    assert_eq!(body["suspiciousNodes"][0]["severity"], "critical");
    assert!(body["recommendation"].as_str().unwrap().contains("'raw_orders'"));
}

#[tokio::test]
async fn root_cause_shares_cached_lineage() {
    let adapter = orders_pipeline().await;
    adapter.add_table(table_meta("raw_orders", 48, 10)).await;
    let app = app(&adapter, memory_cache());

    make_request(app.clone(), "GET", "/api/bigquery/root-cause/proj/ds/orders", None).await;
    let calls = adapter.call_count("lineage_references").await;
    let metadata_calls = adapter.call_count("fetch_table_metadata").await;
    make_request(app, "GET", "/api/bigquery/root-cause/proj/ds/orders", None).await;

    assert_eq!(adapter.call_count("lineage_references").await, calls);
    assert_eq!(adapter.call_count("fetch_table_metadata").await, metadata_calls);
}

#[tokio::test]
async fn edge_query_reports_job_and_cost() {
    let adapter = MockAdapter::for_project("proj");
    let mut job = write_job("j1", hours_ago(5), "MERGE", t("orders"), vec![t("raw_orders")]);
    job.total_bytes_processed = Some(1 << 40);
    adapter.record_job(job).await;

    let (status, body) = make_request(
        app(&adapter, memory_cache()),
        "GET",
        "/api/bigquery/edge-query/proj.ds.raw_orders/proj.ds.orders",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobId"], "j1");
    assert_eq!(body["statementType"], "MERGE");
    assert_eq!(body["estimatedCostUsd"], 5.0);
    assert_eq!(body["source"], "proj.ds.raw_orders");
}

#[tokio::test]
async fn edge_query_without_job_is_not_found() {
    let adapter = orders_pipeline().await;
    let app = app(&adapter, memory_cache());

    let (status, _) = make_request(
        app.clone(),
        "GET",
        "/api/bigquery/edge-query/proj.ds.orders/proj.ds.raw_orders",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = make_request(app, "GET", "/api/bigquery/edge-query/orders/proj.ds.raw_orders", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn table_metadata_includes_freshness() {
    let adapter = MockAdapter::for_project("proj");
    adapter.add_table(table_meta("orders", 2, 10)).await;

    let (status, body) = make_request(
        app(&adapter, memory_cache()),
        "GET",
        "/api/bigquery/table-metadata/proj/ds/orders",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["freshness"], "fresh");
    assert_eq!(body["numRows"], 10);
    assert_eq!(body["table"]["table"], "orders");
}

#[tokio::test]
async fn missing_table_is_not_found() {
    let (status, body) = make_request(
        app(&MockAdapter::for_project("proj"), CacheLayer::disabled()),
        "GET",
        "/api/bigquery/table-metadata/proj/ds/ghost",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn permission_errors_are_generic_403() {
    let adapter = MockAdapter::for_project("proj");
    adapter
        .add_error_for_table(t("secret"), FetchError::PermissionDenied("user lacks bigquery.tables.get".into()))
        .await;

    let (status, body) = make_request(
        app(&adapter, CacheLayer::disabled()),
        "GET",
        "/api/bigquery/table-metadata/proj/ds/secret",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "detail": "access denied" }));
}

#[tokio::test]
async fn preview_limit_is_clamped() {
    let adapter = MockAdapter::for_project("proj");
    adapter.add_table(table_meta("orders", 2, 3)).await;
    let app = app(&adapter, memory_cache());

    let (status, body) = make_request(
        app.clone(),
        "GET",
        "/api/bigquery/table-preview/proj/ds/orders?limit=5000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 1000);
    assert_eq!(body["totalRows"], 3);

    let (_, body) = make_request(app, "GET", "/api/bigquery/table-preview/proj/ds/orders?limit=0", None).await;
    assert_eq!(body["limit"], 1);
    assert_eq!(body["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn schema_lists_tables_with_primary_key_guess() {
    let adapter = MockAdapter::for_project("proj");
    adapter.add_table(table_meta("orders", 2, 10)).await;
    adapter.add_table(table_meta("customers", 2, 4)).await;

    let (status, body) = make_request(app(&adapter, memory_cache()), "GET", "/api/bigquery/schema", None).await;

    assert_eq!(status, StatusCode::OK);
    let tables = body["datasets"][0]["tables"].as_array().unwrap();
    assert_eq!(body["datasets"][0]["name"], "ds");
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["primaryKey"], "order_id");
    assert_eq!(tables[0]["columns"], json!(["name", "order_id"]));
}

#[tokio::test]
async fn assets_counts_inventory() {
    let adapter = MockAdapter::for_project("proj");
    adapter.add_table(table_meta("orders", 2, 10)).await;
    adapter.add_table(table_meta("customers", 2, 4)).await;
    adapter.set_dataset_location("proj", "ds", "US").await;

    let (status, body) = make_request(app(&adapter, memory_cache()), "GET", "/api/bigquery/assets", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalProjects"], 1);
    assert_eq!(body["totalDatasets"], 1);
    assert_eq!(body["totalAssets"], 2);
    assert_eq!(body["projects"][0]["datasets"][0]["location"], "US");
    assert_eq!(body["projects"][0]["datasets"][0]["assets"][0]["type"], "table");
}

#[tokio::test]
async fn select_results_are_cached() {
    let adapter = MockAdapter::for_project("proj");
    adapter
        .add_query_result(
            "SELECT 1 AS one",
            QueryResult {
                schema: vec![FieldSchema {
                    name: "one".into(),
                    field_type: "INT64".into(),
                }],
                rows: vec![serde_json::from_value(json!({ "one": 1 })).unwrap()],
                total_bytes_processed: Some(0),
            },
        )
        .await;
    let app = app(&adapter, memory_cache());
    let request = json!({ "query": "SELECT 1 AS one" });

    let (status, first) = make_request(app.clone(), "POST", "/api/bigquery/execute", Some(request.clone())).await;
    let (_, second) = make_request(app, "POST", "/api/bigquery/execute", Some(request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["total_rows"], 1);
    assert_eq!(first["rows"], json!([{ "one": 1 }]));
    assert_eq!(second["cached"], true);
    assert_eq!(adapter.call_count("run_query").await, 1);
}

#[tokio::test]
async fn non_select_statements_bypass_cache() {
    let adapter = MockAdapter::for_project("proj");
    adapter
        .add_query_result("DELETE FROM ds.orders WHERE true", QueryResult::default())
        .await;
    let app = app(&adapter, memory_cache());
    let request = json!({ "query": "DELETE FROM ds.orders WHERE true" });

    make_request(app.clone(), "POST", "/api/bigquery/execute", Some(request.clone())).await;
    let (_, second) = make_request(app, "POST", "/api/bigquery/execute", Some(request)).await;

    assert_eq!(second["cached"], false);
    assert_eq!(adapter.call_count("run_query").await, 2);
}

#[tokio::test]
async fn failing_queries_are_bad_requests() {
    let app = app(&MockAdapter::for_project("proj"), CacheLayer::disabled());

    let (status, body) = make_request(
        app.clone(),
        "POST",
        "/api/bigquery/execute",
        Some(json!({ "query": "SELECT nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("SELECT nope"));

    let (status, _) = make_request(app, "POST", "/api/bigquery/execute", Some(json!({ "query": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Cache Administration
// ============================================================================

#[tokio::test]
async fn invalidation_rejects_unknown_patterns() {
    let (status, body) = make_request(
        app(&MockAdapter::new(), memory_cache()),
        "DELETE",
        "/api/cache/clear/foo:*",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("lineage:*"));
}

#[tokio::test]
async fn invalidation_deletes_matching_keys() {
    let adapter = orders_pipeline().await;
    let app = app(&adapter, memory_cache());
    make_request(app.clone(), "GET", "/api/bigquery/lineage/proj/ds/orders", None).await;

    let (status, body) = make_request(app.clone(), "DELETE", "/api/cache/clear/lineage:*", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pattern"], "lineage:*");
    assert_eq!(body["deleted"], 1);

    let (_, again) = make_request(app, "GET", "/api/bigquery/lineage/proj/ds/orders", None).await;
    assert_eq!(again["cached"], false);
}

#[tokio::test]
async fn invalidation_without_cache_deletes_nothing() {
    let (status, body) = make_request(
        app(&MockAdapter::new(), CacheLayer::disabled()),
        "DELETE",
        "/api/cache/clear/lineage:*",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);
}

#[tokio::test]
async fn clear_flushes_everything() {
    let adapter = orders_pipeline().await;
    let app = app(&adapter, memory_cache());
    make_request(app.clone(), "GET", "/api/bigquery/lineage/proj/ds/orders", None).await;

    let (status, body) = make_request(app.clone(), "DELETE", "/api/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (_, stats) = make_request(app, "GET", "/api/cache/stats", None).await;
    assert_eq!(stats["totalKeys"], 0);
}

#[tokio::test]
async fn stats_report_hit_rate() {
    let adapter = orders_pipeline().await;
    let app = app(&adapter, memory_cache());
    let path = "/api/bigquery/lineage/proj/ds/orders";
    make_request(app.clone(), "GET", path, None).await;
    make_request(app.clone(), "GET", path, None).await;

    let (status, stats) = make_request(app, "GET", "/api/cache/stats", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["connected"], true);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["hitRate"], 50.0);
}

#[tokio::test]
async fn stats_without_cache_are_disconnected() {
    let (status, stats) = make_request(
        app(&MockAdapter::new(), CacheLayer::disabled()),
        "GET",
        "/api/cache/stats",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats, json!({ "connected": false }));
}
