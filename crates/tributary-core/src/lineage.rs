//! Lineage graph model
//!
//! A graph is rebuilt per request and only ever lives in a response or a
//! cache entry. Nodes and edges are stored in ordered maps keyed by their
//! identity, so two graphs built from the same job history compare equal and
//! serialize identically no matter what order tables were discovered in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ServiceError;
use crate::identity::TableIdentifier;

/// Kind of warehouse object a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Table,
    View,
    MaterializedView,
    External,
}

impl NodeKind {
    /// Map a warehouse `table_type` string (`BASE TABLE`, `VIEW`, ...)
    pub fn from_table_type(table_type: &str) -> Self {
        match table_type.trim().to_uppercase().replace(' ', "_").as_str() {
            "VIEW" => Self::View,
            "MATERIALIZED_VIEW" => Self::MaterializedView,
            "EXTERNAL" => Self::External,
            _ => Self::Table,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::MaterializedView => "materialized_view",
            Self::External => "external",
        }
    }
}

/// Which way to walk the job history from the root table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Tables the root was derived from
    Upstream,
    /// Tables derived from the root
    Downstream,
    #[default]
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upstream" => Ok(Self::Upstream),
            "downstream" => Ok(Self::Downstream),
            "both" => Ok(Self::Both),
            other => Err(ServiceError::InvalidInput(format!(
                "direction must be one of upstream, downstream, both (got '{}')",
                other
            ))),
        }
    }
}

/// A table discovered during a lineage walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageNode {
    /// Identity key (`project.dataset.table`)
    pub id: String,

    /// Display label (the table name)
    pub label: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    pub project_id: String,

    pub dataset_id: String,

    pub table_name: String,

    /// BFS distance from the root (root = 0)
    pub level: u32,
}

impl LineageNode {
    pub fn new(table: &TableIdentifier, level: u32) -> Self {
        Self {
            id: table.fqn(),
            label: table.table.clone(),
            kind: NodeKind::Table,
            project_id: table.project.clone(),
            dataset_id: table.dataset.clone(),
            table_name: table.table.clone(),
            level,
        }
    }

    /// Recover the table identity from the display fields
    pub fn table(&self) -> TableIdentifier {
        TableIdentifier::new(&self.project_id, &self.dataset_id, &self.table_name)
    }
}

/// Relationship carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    #[default]
    Dependency,
}

/// Directed edge: `target` was derived from `source`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source: String,

    pub target: String,

    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

impl LineageEdge {
    pub fn dependency(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Dependency,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.source.clone(), self.target.clone())
    }
}

/// Deduplicated lineage graph around a root table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GraphPayload", into = "GraphPayload")]
pub struct LineageGraph {
    root: String,
    nodes: BTreeMap<String, LineageNode>,
    edges: BTreeMap<(String, String), LineageEdge>,
}

impl LineageGraph {
    /// Create a graph holding only the root node at level 0
    pub fn new(root: &TableIdentifier) -> Self {
        let root_node = LineageNode::new(root, 0);
        let mut graph = Self {
            root: root_node.id.clone(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        };
        graph.insert_node(root_node);
        graph
    }

    /// Insert a node, collapsing by identity
    ///
    /// A repeated discovery refreshes the display fields but keeps the
    /// shortest distance from the root. Returns `true` if the node was new.
    pub fn insert_node(&mut self, node: LineageNode) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                let level = existing.level.min(node.level);
                *existing = node;
                existing.level = level;
                false
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
                true
            }
        }
    }

    /// Insert an edge, collapsing by `(source, target)` (last write wins)
    pub fn insert_edge(&mut self, edge: LineageEdge) -> bool {
        self.edges.insert(edge.key(), edge).is_none()
    }

    /// Fold another graph into this one
    pub fn merge(&mut self, other: LineageGraph) {
        for node in other.nodes.into_values() {
            self.insert_node(node);
        }
        for edge in other.edges.into_values() {
            self.insert_edge(edge);
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&LineageNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &LineageNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &LineageEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edges.contains_key(&(source.to_string(), target.to_string()))
    }

    /// Sources of every edge pointing at `id`
    pub fn parents_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .values()
            .filter(move |edge| edge.target == id)
            .map(|edge| edge.source.as_str())
    }
}

/// Wire shape of a lineage graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphPayload {
    nodes: Vec<LineageNode>,
    edges: Vec<LineageEdge>,
    root_node: String,
}

impl From<LineageGraph> for GraphPayload {
    fn from(graph: LineageGraph) -> Self {
        Self {
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges.into_values().collect(),
            root_node: graph.root,
        }
    }
}

impl From<GraphPayload> for LineageGraph {
    fn from(payload: GraphPayload) -> Self {
        let mut graph = Self {
            root: payload.root_node,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        };
        for node in payload.nodes {
            graph.insert_node(node);
        }
        for edge in payload.edges {
            graph.insert_edge(edge);
        }
        graph
    }
}
