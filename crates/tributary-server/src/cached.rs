//! Cache-aside wrappers for the lineage engine's capabilities
//!
//! Root-cause analysis goes through these so the upstream graph and every
//! ancestor probe share cache entries with the HTTP endpoints.

use std::sync::Arc;
use tributary_cache::{CacheKind, CacheLayer, Cached};
use tributary_catalog::{FailureQuery, JobFailure, TableMetadata, WarehouseAdapter};
use tributary_core::{Direction, LineageGraph, ServiceError, TableIdentifier};
use tributary_lineage::{AncestorProbe, LineageBuilder, LineageProvider};

/// Lineage provider backed by `lineage:` cache entries
#[derive(Clone)]
pub struct CachedLineage {
    builder: Arc<LineageBuilder>,
    cache: CacheLayer,
}

impl CachedLineage {
    pub fn new(builder: Arc<LineageBuilder>, cache: CacheLayer) -> Self {
        Self { builder, cache }
    }

    pub fn builder(&self) -> &LineageBuilder {
        &self.builder
    }

    pub async fn fetch(
        &self,
        root: &TableIdentifier,
        direction: Direction,
        depth: u32,
    ) -> Result<Cached<LineageGraph>, ServiceError> {
        let key = CacheKind::Lineage.key(&[&root.project, &root.dataset, &root.table, &direction, &depth]);
        self.cache
            .get_or_compute(&key, || async move {
                Ok::<_, ServiceError>(self.builder.build(root, direction, depth).await)
            })
            .await
    }
}

#[async_trait::async_trait]
impl LineageProvider for CachedLineage {
    async fn lineage(
        &self,
        root: &TableIdentifier,
        direction: Direction,
        depth: u32,
    ) -> Result<LineageGraph, ServiceError> {
        Ok(self.fetch(root, direction, depth).await?.value)
    }
}

/// Ancestor probe backed by `meta:` and `failures:` cache entries
#[derive(Clone)]
pub struct CachedProbe {
    adapter: Arc<dyn WarehouseAdapter>,
    cache: CacheLayer,
}

impl CachedProbe {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, cache: CacheLayer) -> Self {
        Self { adapter, cache }
    }

    pub async fn metadata_cached(&self, table: &TableIdentifier) -> Result<Cached<TableMetadata>, ServiceError> {
        let key = CacheKind::TableMetadata.key(&[&table.fqn()]);
        self.cache
            .get_or_compute(&key, || async move {
                self.adapter
                    .fetch_table_metadata(table)
                    .await
                    .map_err(ServiceError::from)
            })
            .await
    }
}

#[async_trait::async_trait]
impl AncestorProbe for CachedProbe {
    async fn metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, ServiceError> {
        Ok(self.metadata_cached(table).await?.value)
    }

    async fn failures(&self, table: &TableIdentifier, hours: u32, limit: u32) -> Result<Vec<JobFailure>, ServiceError> {
        let key = CacheKind::Failures.key(&[&table.fqn(), &hours, &limit]);
        let query = FailureQuery::new(table.clone(), hours, limit);

        let cached = self
            .cache
            .get_or_compute(&key, || async move {
                self.adapter
                    .recent_failures(&query)
                    .await
                    .map_err(ServiceError::from)
            })
            .await?;
        Ok(cached.value)
    }
}
