//! Lineage graph reconstruction from job history
//!
//! Each direction is walked breadth-first, one level per round. All frontier
//! tables of a level are queried concurrently (bounded by
//! `lineage.frontier_concurrency`), and a visited set shared across levels
//! guarantees each table is queried once, so cycles terminate. For
//! [`Direction::Both`] the two walks run concurrently and are merged.
//!
//! Edges always point from the table that was read to the table that was
//! written, whichever way the walk goes.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tributary_catalog::{FetchError, ReferenceQuery, ReferenceSide, WarehouseAdapter};
use tributary_core::{
    Direction, LineageConfig, LineageEdge, LineageGraph, LineageNode, ServiceError, TableIdentifier,
};

use crate::partial::Partial;

/// Source of lineage graphs
#[async_trait::async_trait]
pub trait LineageProvider: Send + Sync {
    async fn lineage(
        &self,
        root: &TableIdentifier,
        direction: Direction,
        depth: u32,
    ) -> Result<LineageGraph, ServiceError>;
}

/// Builds lineage graphs by mining warehouse job history
pub struct LineageBuilder {
    adapter: Arc<dyn WarehouseAdapter>,
    config: LineageConfig,
}

impl LineageBuilder {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, config: LineageConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// Build the graph around `root`, `depth` hops in the given direction
    ///
    /// Never fails: frontier queries that error are logged and contribute
    /// nothing.
    pub async fn build(&self, root: &TableIdentifier, direction: Direction, depth: u32) -> LineageGraph {
        let depth = depth.clamp(1, self.config.max_depth.max(1));
        tracing::debug!(root = %root, %direction, depth, "building lineage");

        let graph = match direction {
            Direction::Upstream => self.walk(root, ReferenceSide::Sources, depth).await,
            Direction::Downstream => self.walk(root, ReferenceSide::Destinations, depth).await,
            Direction::Both => {
                let (mut upstream, downstream) = tokio::join!(
                    self.walk(root, ReferenceSide::Sources, depth),
                    self.walk(root, ReferenceSide::Destinations, depth),
                );
                upstream.merge(downstream);
                upstream
            }
        };

        tracing::info!(
            root = %root,
            %direction,
            depth,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "lineage built"
        );
        graph
    }

    fn query_for(&self, side: ReferenceSide, table: &TableIdentifier) -> ReferenceQuery {
        match side {
            ReferenceSide::Sources => {
                ReferenceQuery::sources_of(table.clone(), self.config.lookback_days, self.config.result_limit)
            }
            ReferenceSide::Destinations => {
                ReferenceQuery::destinations_of(table.clone(), self.config.lookback_days, self.config.result_limit)
            }
        }
    }

    async fn walk(&self, root: &TableIdentifier, side: ReferenceSide, depth: u32) -> LineageGraph {
        let mut graph = LineageGraph::new(root);
        let mut visited: HashSet<TableIdentifier> = HashSet::from([root.clone()]);
        let mut frontier = vec![root.clone()];

        for level in 1..=depth {
            if frontier.is_empty() {
                break;
            }

            let discovered: Partial<(TableIdentifier, Vec<TableIdentifier>), FetchError> =
                stream::iter(frontier.drain(..))
                    .map(|table| async move {
                        let result = self.adapter.lineage_references(&self.query_for(side, &table)).await;
                        (table.fqn(), result.map(|found| (table, found)))
                    })
                    .buffer_unordered(self.config.frontier_concurrency.max(1))
                    .collect()
                    .await;

            for (table, found) in discovered.into_items("lineage frontier query") {
                for other in found {
                    // A job reading and writing the same table
                    if other == table {
                        continue;
                    }

                    let edge = match side {
                        ReferenceSide::Sources => LineageEdge::dependency(other.fqn(), table.fqn()),
                        ReferenceSide::Destinations => LineageEdge::dependency(table.fqn(), other.fqn()),
                    };
                    graph.insert_node(LineageNode::new(&other, level));
                    graph.insert_edge(edge);

                    if visited.insert(other.clone()) {
                        frontier.push(other);
                    }
                }
            }
        }

        graph
    }
}

#[async_trait::async_trait]
impl LineageProvider for LineageBuilder {
    async fn lineage(
        &self,
        root: &TableIdentifier,
        direction: Direction,
        depth: u32,
    ) -> Result<LineageGraph, ServiceError> {
        Ok(self.build(root, direction, depth).await)
    }
}
