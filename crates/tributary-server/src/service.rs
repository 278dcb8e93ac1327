//! Catalog service: every API operation, cache-aside over the warehouse

use chrono::Utc;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use tributary_cache::{CacheError, CacheKind, CacheLayer, CacheStats, Cached};
use tributary_catalog::{EdgeJobQuery, TableMetadata, WarehouseAdapter};
use tributary_core::{
    Config, Direction, Freshness, FreshnessThresholds, LineageGraph, ServiceError, TableIdentifier,
};
use tributary_lineage::{LineageBuilder, Partial, RootCauseAnalyzer, RootCauseReport};

use crate::cached::{CachedLineage, CachedProbe};
use crate::payload::{
    AssetsResponse, CacheClearResponse, CacheInvalidateResponse, DatasetAssets, EdgeQueryResponse,
    ExecuteResponse, PreviewResponse, ProjectAssets, SchemaDataset, SchemaResponse, SchemaTable,
    TableMetadataResponse,
};

pub const DEFAULT_PREVIEW_LIMIT: u32 = 100;
pub const MAX_PREVIEW_LIMIT: u32 = 1000;

/// Clamp a requested preview size into `1..=1000`
pub fn clamp_preview_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_PREVIEW_LIMIT)
        .clamp(1, MAX_PREVIEW_LIMIT)
}

/// Only read-only statements are cached
pub fn is_cacheable_query(sql: &str) -> bool {
    sql.trim().to_uppercase().starts_with("SELECT")
}

fn query_digest(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

pub struct CatalogService {
    adapter: Arc<dyn WarehouseAdapter>,
    cache: CacheLayer,
    lineage: CachedLineage,
    probe: CachedProbe,
    analyzer: RootCauseAnalyzer,
    config: Config,
}

impl CatalogService {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, cache: CacheLayer, config: Config) -> Self {
        let builder = Arc::new(LineageBuilder::new(adapter.clone(), config.lineage.clone()));
        let lineage = CachedLineage::new(builder, cache.clone());
        let probe = CachedProbe::new(adapter.clone(), cache.clone());
        let analyzer = RootCauseAnalyzer::new(Arc::new(probe.clone()), config.analysis.clone());

        Self {
            adapter,
            cache,
            lineage,
            probe,
            analyzer,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<dyn WarehouseAdapter> {
        &self.adapter
    }

    // =========================================================================
    // Catalog browsing
    // =========================================================================

    /// Datasets with their tables, columns and a guessed primary key
    pub async fn schema(&self) -> Result<Cached<SchemaResponse>, ServiceError> {
        let key = CacheKind::Schema.key(&[&"all_datasets"]);
        self.cache
            .get_or_compute(&key, || self.load_schema())
            .await
    }

    async fn load_schema(&self) -> Result<SchemaResponse, ServiceError> {
        let project = self.adapter.project_id().to_string();
        let datasets = self.adapter.list_datasets(&project).await?;

        let mut out = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let summaries = match self.adapter.list_tables(&project, &dataset.dataset_id).await {
                Ok(summaries) => summaries,
                Err(err) => {
                    tracing::warn!(dataset = %dataset.dataset_id, error = %err, "skipping dataset");
                    continue;
                }
            };

            let fetched = join_all(summaries.iter().map(|summary| {
                let table = TableIdentifier::new(&project, &dataset.dataset_id, &summary.table_id);
                async move {
                    let result = self.adapter.fetch_table_metadata(&table).await;
                    (table.fqn(), result)
                }
            }))
            .await;

            let tables: Vec<SchemaTable> = fetched
                .into_iter()
                .collect::<Partial<TableMetadata, _>>()
                .into_items("schema")
                .iter()
                .map(SchemaTable::from)
                .collect();

            if !tables.is_empty() {
                out.push(SchemaDataset {
                    name: dataset.dataset_id,
                    tables,
                });
            }
        }

        Ok(SchemaResponse { datasets: out })
    }

    /// Run an ad-hoc query; SELECT results are cached briefly
    pub async fn execute(&self, sql: &str) -> Result<Cached<ExecuteResponse>, ServiceError> {
        if sql.trim().is_empty() {
            return Err(ServiceError::InvalidInput("query must not be empty".to_string()));
        }

        let run = || async move {
            let result = self.adapter.run_query(sql).await.map_err(|err| match ServiceError::from(err) {
                ServiceError::Forbidden(detail) => ServiceError::Forbidden(detail),
                other => ServiceError::InvalidInput(other.to_string()),
            })?;
            Ok::<_, ServiceError>(ExecuteResponse {
                total_rows: result.rows.len(),
                schema: result.schema,
                rows: result.rows,
            })
        };

        if !is_cacheable_query(sql) {
            return Ok(Cached::fresh(run().await?));
        }

        let key = CacheKind::Query.key(&[&query_digest(sql)]);
        self.cache.get_or_compute(&key, run).await
    }

    /// Inventory of the configured project
    pub async fn assets(&self) -> Result<Cached<AssetsResponse>, ServiceError> {
        let key = CacheKind::Assets.key(&[&"all_projects"]);
        self.cache
            .get_or_compute(&key, || self.load_assets())
            .await
    }

    async fn load_assets(&self) -> Result<AssetsResponse, ServiceError> {
        let project = self.adapter.project_id().to_string();
        let datasets = self.adapter.list_datasets(&project).await?;

        let listed = join_all(datasets.into_iter().map(|dataset| {
            let project = project.clone();
            async move {
                let result = self
                    .adapter
                    .list_tables(&project, &dataset.dataset_id)
                    .await
                    .map(|summaries| DatasetAssets {
                        name: dataset.dataset_id.clone(),
                        location: dataset.location.clone(),
                        assets: summaries.into_iter().map(Into::into).collect(),
                    });
                (dataset.dataset_id, result)
            }
        }))
        .await;

        let datasets = listed.into_iter().collect::<Partial<_, _>>().into_items("assets");
        Ok(AssetsResponse::new(vec![ProjectAssets {
            id: project.clone(),
            name: project,
            datasets,
        }]))
    }

    /// Table metadata with freshness computed at response time
    pub async fn table_metadata(&self, table: &TableIdentifier) -> Result<Cached<TableMetadataResponse>, ServiceError> {
        table.validate()?;
        let thresholds = FreshnessThresholds {
            fresh_hours: self.config.analysis.fresh_hours,
            stale_hours: self.config.analysis.stale_hours,
        };
        let now = Utc::now();

        let cached = self.probe.metadata_cached(table).await?;
        Ok(cached.map(|metadata| TableMetadataResponse {
            freshness: metadata
                .modified_at
                .map(|modified| Freshness::classify(modified, now, &thresholds)),
            metadata,
        }))
    }

    pub async fn preview(
        &self,
        table: &TableIdentifier,
        limit: Option<u32>,
    ) -> Result<Cached<PreviewResponse>, ServiceError> {
        table.validate()?;
        let limit = clamp_preview_limit(limit);
        let key = CacheKind::Preview.key(&[&table.fqn(), &limit]);

        self.cache
            .get_or_compute(&key, || async move {
                let result = self.adapter.preview_rows(table, limit).await?;
                Ok::<_, ServiceError>(PreviewResponse {
                    table: table.clone(),
                    total_rows: result.rows.len(),
                    schema: result.schema,
                    rows: result.rows,
                    limit,
                })
            })
            .await
    }

    // =========================================================================
    // Lineage
    // =========================================================================

    pub async fn lineage(
        &self,
        table: &TableIdentifier,
        direction: Option<&str>,
        depth: Option<u32>,
    ) -> Result<Cached<LineageGraph>, ServiceError> {
        table.validate()?;
        let direction = match direction {
            Some(raw) => raw.parse::<Direction>()?,
            None => Direction::Both,
        };
        let depth = self.config.clamp_depth(depth);

        self.lineage.fetch(table, direction, depth).await
    }

    /// Most recent job that wrote `target` while reading `source`
    pub async fn edge_query(&self, source: &str, target: &str) -> Result<Cached<EdgeQueryResponse>, ServiceError> {
        let source = TableIdentifier::parse(source)?;
        let target = TableIdentifier::parse(target)?;
        let key = CacheKind::EdgeQuery.key(&[&source.fqn(), &target.fqn()]);
        let query = EdgeJobQuery::new(
            source.clone(),
            target.clone(),
            self.config.lineage.lookback_days,
        );

        self.cache
            .get_or_compute(&key, || async move {
                match self.adapter.edge_job(&query).await? {
                    Some(job) => Ok::<_, ServiceError>(EdgeQueryResponse::from_job(&source, &target, job)),
                    None => Err(ServiceError::NotFound(format!(
                        "no job wrote {} from {} in the last {} days",
                        target, source, query.lookback_days
                    ))),
                }
            })
            .await
    }

    pub async fn root_cause(&self, table: &TableIdentifier) -> Result<RootCauseReport, ServiceError> {
        table.validate()?;
        self.analyzer.diagnose(table, &self.lineage).await
    }

    // =========================================================================
    // Cache administration
    // =========================================================================

    pub async fn cache_clear(&self) -> CacheClearResponse {
        let cleared = self.cache.clear().await;
        CacheClearResponse {
            status: if cleared { "cache cleared" } else { "cache unavailable" }.to_string(),
            cleared,
        }
    }

    pub async fn cache_invalidate(&self, pattern: &str) -> Result<CacheInvalidateResponse, CacheError> {
        let deleted = self.cache.invalidate(pattern).await?;
        Ok(CacheInvalidateResponse {
            status: "invalidated".to_string(),
            pattern: pattern.to_string(),
            deleted,
        })
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}
