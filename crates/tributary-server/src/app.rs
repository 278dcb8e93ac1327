//! Process wiring: warehouse, cache, service, listener

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use tributary_cache::{build_store, CacheLayer};
use tributary_catalog::{BigQueryAdapter, GuardedAdapter, WarehouseAdapter};
use tributary_core::{Config, WarehouseConfig};

use crate::routes::{router, AppState};
use crate::service::CatalogService;

/// Connect to BigQuery and wrap the adapter with limits and retries
pub async fn connect_warehouse(config: &WarehouseConfig) -> Result<Arc<dyn WarehouseAdapter>> {
    let Some(project_id) = config.project_id.clone() else {
        bail!("no warehouse project configured (set warehouse.project_id or GOOGLE_CLOUD_PROJECT)");
    };

    let adapter = match &config.credentials_path {
        Some(path) => BigQueryAdapter::from_service_account_file(&project_id, &config.location, path)
            .await
            .with_context(|| format!("loading credentials from {}", path))?,
        None => BigQueryAdapter::with_adc(&project_id, &config.location)
            .await
            .context("initializing application default credentials")?,
    };

    let adapter = adapter.with_max_wait(Duration::from_secs(config.query_timeout_secs));

    tracing::info!(project = %project_id, location = %config.location, "warehouse adapter ready");
    Ok(Arc::new(GuardedAdapter::from_config(Arc::new(adapter), config)))
}

/// Build the service around an adapter, connecting the configured cache
pub async fn build_service(adapter: Arc<dyn WarehouseAdapter>, config: Config) -> CatalogService {
    let cache = CacheLayer::new(build_store(&config.cache).await);
    CatalogService::new(adapter, cache, config)
}

/// Serve the HTTP API until ctrl-c
pub async fn serve(service: CatalogService) -> Result<()> {
    let addr = format!("{}:{}", service.config().server.host, service.config().server.port);
    let app = router(Arc::new(AppState::new(service)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}
