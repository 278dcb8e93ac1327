//! Upstream root-cause analysis
//!
//! Walks the upstream graph backwards from the target, probes every
//! ancestor for metadata and recent job failures, scores it against the
//! health heuristics and ranks the flagged ancestors by severity.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tributary_catalog::{FailureQuery, JobFailure, TableMetadata, WarehouseAdapter};
use tributary_core::{
    age_hours, AnalysisConfig, Direction, Freshness, FreshnessThresholds, LineageGraph, LineageNode,
    ServiceError, Severity, TableIdentifier,
};

use crate::builder::LineageProvider;

pub const NO_ISSUES_RECOMMENDATION: &str =
    "No obvious upstream issues detected. The problem may be in the transformation logic or external factors.";

pub const CASCADING_RECOMMENDATION: &str =
    "Check the flagged upstream tables. Issues may be cascading from multiple sources.";

/// Per-ancestor health lookups
#[async_trait::async_trait]
pub trait AncestorProbe: Send + Sync {
    async fn metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, ServiceError>;

    async fn failures(&self, table: &TableIdentifier, hours: u32, limit: u32) -> Result<Vec<JobFailure>, ServiceError>;
}

/// Probe that goes straight to the warehouse
pub struct AdapterProbe {
    adapter: Arc<dyn WarehouseAdapter>,
}

impl AdapterProbe {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait::async_trait]
impl AncestorProbe for AdapterProbe {
    async fn metadata(&self, table: &TableIdentifier) -> Result<TableMetadata, ServiceError> {
        Ok(self.adapter.fetch_table_metadata(table).await?)
    }

    async fn failures(&self, table: &TableIdentifier, hours: u32, limit: u32) -> Result<Vec<JobFailure>, ServiceError> {
        let query = FailureQuery::new(table.clone(), hours, limit);
        Ok(self.adapter.recent_failures(&query).await?)
    }
}

/// An ancestor with at least one health issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousNode {
    pub node: LineageNode,
    pub issues: Vec<String>,
    pub severity: Severity,
    pub last_modified: Option<DateTime<Utc>>,
    pub freshness: Option<Freshness>,
    pub num_rows: Option<i64>,
    pub job_failures: Vec<JobFailure>,
}

/// Ranked diagnosis for a target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCauseReport {
    pub suspicious_nodes: Vec<SuspiciousNode>,
    /// Tables visited, target included
    pub analyzed_nodes: usize,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
}

/// Score one ancestor; `None` when nothing looks wrong
pub fn evaluate(
    node: &LineageNode,
    metadata: &TableMetadata,
    failures: Vec<JobFailure>,
    config: &AnalysisConfig,
    now: DateTime<Utc>,
) -> Option<SuspiciousNode> {
    let thresholds = FreshnessThresholds {
        fresh_hours: config.fresh_hours,
        stale_hours: config.stale_hours,
    };
    let mut issues = Vec::new();
    let mut severity = Severity::Info;

    let age = metadata.modified_at.map(|modified| age_hours(modified, now));
    let freshness = age.map(|hours| Freshness::from_age_hours(hours, &thresholds));

    match freshness {
        Some(Freshness::Stale) => {
            issues.push(format!(
                "Data is stale (not updated in >{} hours)",
                config.stale_hours
            ));
            severity = severity.escalate(Severity::Critical);
        }
        Some(Freshness::Recent) => {
            issues.push(format!("Data may be outdated (>{} hours old)", config.fresh_hours));
            severity = severity.escalate(Severity::Warning);
        }
        _ => {}
    }

    if let Some(hours) = age {
        if hours < config.breaking_change_hours {
            issues.push(format!(
                "Modified {} hours ago (potential breaking change)",
                hours.max(0.0).trunc() as i64
            ));
            severity = severity.escalate(Severity::Critical);
        }
    }

    if metadata.num_rows == Some(0) {
        issues.push("Table is empty (0 rows)".to_string());
        severity = severity.escalate(Severity::Critical);
    }

    if !failures.is_empty() {
        issues.push(format!(
            "{} job failure(s) in last {} hours",
            failures.len(),
            config.failure_lookback_hours
        ));
        severity = severity.escalate(Severity::Critical);
    }

    if issues.is_empty() {
        return None;
    }

    let mut node = node.clone();
    node.kind = metadata.kind;

    Some(SuspiciousNode {
        node,
        issues,
        severity,
        last_modified: metadata.modified_at,
        freshness,
        num_rows: metadata.num_rows,
        job_failures: failures,
    })
}

/// Recommendation text for an already ranked list
pub fn recommend(ranked: &[SuspiciousNode]) -> String {
    match ranked.first() {
        None => NO_ISSUES_RECOMMENDATION.to_string(),
        Some(top) if top.severity == Severity::Critical => format!(
            "Start by investigating '{}'. It has critical issues that are likely propagating downstream.",
            top.node.label
        ),
        Some(_) => CASCADING_RECOMMENDATION.to_string(),
    }
}

/// Ancestors of `target` in BFS order, plus the visited count (target included)
pub fn upstream_ancestors<'a>(target: &str, graph: &'a LineageGraph) -> (Vec<&'a LineageNode>, usize) {
    let mut visited: HashSet<&str> = HashSet::from([target]);
    let mut queue = VecDeque::from([target]);
    let mut ancestors = Vec::new();

    while let Some(current) = queue.pop_front() {
        for source in graph.parents_of(current) {
            if visited.insert(source) {
                queue.push_back(source);
                if let Some(node) = graph.node(source) {
                    ancestors.push(node);
                }
            }
        }
    }

    (ancestors, visited.len())
}

/// Root-cause analyzer
pub struct RootCauseAnalyzer {
    probe: Arc<dyn AncestorProbe>,
    config: AnalysisConfig,
}

impl RootCauseAnalyzer {
    pub fn new(probe: Arc<dyn AncestorProbe>, config: AnalysisConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Build the upstream graph through `provider`, then analyze it
    pub async fn diagnose(
        &self,
        target: &TableIdentifier,
        provider: &dyn LineageProvider,
    ) -> Result<RootCauseReport, ServiceError> {
        let graph = provider
            .lineage(target, Direction::Upstream, self.config.lineage_depth)
            .await?;
        Ok(self.analyze(target, &graph).await)
    }

    /// Analyze an upstream graph already built around `target`
    pub async fn analyze(&self, target: &TableIdentifier, graph: &LineageGraph) -> RootCauseReport {
        let target_id = target.fqn();
        let (ancestors, analyzed_nodes) = upstream_ancestors(&target_id, graph);
        let now = Utc::now();

        tracing::info!(target = %target, ancestors = ancestors.len(), "analyzing upstream tables");

        // futures are built eagerly (still lazy until polled) so the stream type
        // carries no closure; keeps the handler future provably `Send`
        let probes: Vec<_> = ancestors
            .into_iter()
            .map(|node| self.probe_node(node, now))
            .collect();
        let scored: Vec<Option<SuspiciousNode>> = stream::iter(probes)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut suspicious: Vec<SuspiciousNode> = scored.into_iter().flatten().collect();
        // stable: BFS order is kept within a severity
        suspicious.sort_by_key(|s| s.severity.rank());

        let recommendation = recommend(&suspicious);
        tracing::info!(
            target = %target,
            analyzed = analyzed_nodes,
            flagged = suspicious.len(),
            "root-cause analysis finished"
        );

        RootCauseReport {
            suspicious_nodes: suspicious,
            analyzed_nodes,
            recommendation,
            timestamp: now,
        }
    }

    async fn probe_node(&self, node: &LineageNode, now: DateTime<Utc>) -> Option<SuspiciousNode> {
        let table = node.table();

        let metadata = match self.probe.metadata(&table).await {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(table = %table, error = %err, "skipping ancestor, metadata unavailable");
                return None;
            }
        };

        let failures = match self
            .probe
            .failures(&table, self.config.failure_lookback_hours, self.config.failure_limit)
            .await
        {
            Ok(failures) => failures,
            Err(err) => {
                tracing::warn!(table = %table, error = %err, "skipping ancestor, job failure history unavailable");
                return None;
            }
        };

        evaluate(node, &metadata, failures, &self.config, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tributary_core::{LineageEdge, NodeKind};

    fn t(name: &str) -> TableIdentifier {
        TableIdentifier::new("p", "d", name)
    }

    fn meta(name: &str, modified_hours_ago: i64, rows: i64, now: DateTime<Utc>) -> TableMetadata {
        let mut m = TableMetadata::empty(t(name));
        m.modified_at = Some(now - Duration::hours(modified_hours_ago));
        m.num_rows = Some(rows);
        m
    }

    fn failure(id: &str, now: DateTime<Utc>) -> JobFailure {
        JobFailure {
            job_id: id.to_string(),
            creation_time: now,
            error_reason: Some("invalidQuery".to_string()),
            error_message: None,
        }
    }

    #[test]
    fn stale_table_is_critical() {
        let now = Utc::now();
        let node = LineageNode::new(&t("raw"), 1);
        let s = evaluate(&node, &meta("raw", 200, 10, now), vec![], &AnalysisConfig::default(), now).unwrap();

        assert_eq!(s.severity, Severity::Critical);
        assert_eq!(s.issues, vec!["Data is stale (not updated in >168 hours)".to_string()]);
        assert_eq!(s.freshness, Some(Freshness::Stale));
    }

    #[test]
    fn recent_table_is_a_warning() {
        let now = Utc::now();
        let node = LineageNode::new(&t("raw"), 1);
        let s = evaluate(&node, &meta("raw", 48, 10, now), vec![], &AnalysisConfig::default(), now).unwrap();

        assert_eq!(s.severity, Severity::Warning);
        assert_eq!(s.issues, vec!["Data may be outdated (>24 hours old)".to_string()]);
    }

    #[test]
    fn fresh_modification_flags_breaking_change() {
        let now = Utc::now();
        let node = LineageNode::new(&t("raw"), 1);
        let s = evaluate(&node, &meta("raw", 5, 10, now), vec![], &AnalysisConfig::default(), now).unwrap();

        assert_eq!(s.severity, Severity::Critical);
        assert_eq!(s.issues, vec!["Modified 5 hours ago (potential breaking change)".to_string()]);
    }

    #[test]
    fn healthy_table_is_not_flagged() {
        let now = Utc::now();
        let config = AnalysisConfig {
            breaking_change_hours: 0.0,
            ..AnalysisConfig::default()
        };
        let node = LineageNode::new(&t("raw"), 1);
        assert!(evaluate(&node, &meta("raw", 5, 10, now), vec![], &config, now).is_none());
    }

    #[test]
    fn severity_never_drops_after_critical() {
        let now = Utc::now();
        let node = LineageNode::new(&t("raw"), 1);
        let mut m = meta("raw", 48, 0, now);
        m.kind = NodeKind::View;
        let s = evaluate(
            &node,
            &m,
            vec![failure("j1", now), failure("j2", now)],
            &AnalysisConfig::default(),
            now,
        )
        .unwrap();

        assert_eq!(s.severity, Severity::Critical);
        assert_eq!(
            s.issues,
            vec![
                "Data may be outdated (>24 hours old)".to_string(),
                "Table is empty (0 rows)".to_string(),
                "2 job failure(s) in last 24 hours".to_string(),
            ]
        );
        assert_eq!(s.node.kind, NodeKind::View);
    }

    #[test]
    fn recommendations() {
        let now = Utc::now();
        let node = LineageNode::new(&t("raw_orders"), 1);
        let warning = evaluate(&node, &meta("raw_orders", 48, 10, now), vec![], &AnalysisConfig::default(), now).unwrap();
        let critical = evaluate(&node, &meta("raw_orders", 48, 0, now), vec![], &AnalysisConfig::default(), now).unwrap();

        assert_eq!(recommend(&[]), NO_ISSUES_RECOMMENDATION);
        assert_eq!(recommend(&[warning]), CASCADING_RECOMMENDATION);
        assert_eq!(
            recommend(&[critical]),
            "Start by investigating 'raw_orders'. It has critical issues that are likely propagating downstream."
        );
    }

    #[test]
    fn ancestors_follow_edges_backwards() {
        let mut graph = LineageGraph::new(&t("target"));
        for (src, dst, level) in [("a", "target", 1), ("b", "a", 2), ("a", "b", 2)] {
            graph.insert_node(LineageNode::new(&t(src), level));
            graph.insert_edge(LineageEdge::dependency(t(src).fqn(), t(dst).fqn()));
        }
        // downstream table must not be visited
        graph.insert_node(LineageNode::new(&t("child"), 1));
        graph.insert_edge(LineageEdge::dependency(t("target").fqn(), t("child").fqn()));

        let (ancestors, analyzed) = upstream_ancestors(&t("target").fqn(), &graph);
        let ids: Vec<_> = ancestors.iter().map(|n| n.id.as_str()).collect();

        assert_eq!(ids, vec!["p.d.a", "p.d.b"]);
        assert_eq!(analyzed, 3);
    }
}
