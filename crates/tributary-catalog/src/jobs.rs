//! Job-history queries
//!
//! Lineage is mined from `INFORMATION_SCHEMA.JOBS_BY_PROJECT`. Each query
//! here is a typed description that can be rendered to SQL for the warehouse
//! or evaluated against an in-memory job log; both paths share the same
//! filter semantics.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tributary_core::TableIdentifier;

use crate::types::{JobFailure, JobRecord};

/// Statement types that write a destination while reading sources
pub const UPSTREAM_STATEMENT_TYPES: &[&str] = &["INSERT", "CREATE_TABLE_AS_SELECT", "MERGE"];

/// Downstream discovery also follows in-place updates
pub const DOWNSTREAM_STATEMENT_TYPES: &[&str] = &["INSERT", "CREATE_TABLE_AS_SELECT", "MERGE", "UPDATE"];

/// Which side of a job the frontier table sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceSide {
    /// Frontier is the destination; return the tables it read
    Sources,
    /// Frontier was read; return the destinations written
    Destinations,
}

/// Find tables linked to `table` through write jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceQuery {
    pub table: TableIdentifier,
    pub side: ReferenceSide,
    pub lookback_days: u32,
    pub limit: u32,
}

impl ReferenceQuery {
    pub fn sources_of(table: TableIdentifier, lookback_days: u32, limit: u32) -> Self {
        Self {
            table,
            side: ReferenceSide::Sources,
            lookback_days,
            limit,
        }
    }

    pub fn destinations_of(table: TableIdentifier, lookback_days: u32, limit: u32) -> Self {
        Self {
            table,
            side: ReferenceSide::Destinations,
            lookback_days,
            limit,
        }
    }

    pub fn statement_types(&self) -> &'static [&'static str] {
        match self.side {
            ReferenceSide::Sources => UPSTREAM_STATEMENT_TYPES,
            ReferenceSide::Destinations => DOWNSTREAM_STATEMENT_TYPES,
        }
    }

    /// Render against a regional JOBS_BY_PROJECT view
    pub fn to_sql(&self, location: &str) -> String {
        let t = &self.table;
        let statement_types = sql_list(self.statement_types());

        match self.side {
            ReferenceSide::Sources => format!(
                r#"
                SELECT DISTINCT
                    referenced_table.project_id AS project_id,
                    referenced_table.dataset_id AS dataset_id,
                    referenced_table.table_id AS table_id
                FROM `{location}`.INFORMATION_SCHEMA.JOBS_BY_PROJECT,
                UNNEST(referenced_tables) AS referenced_table
                WHERE destination_table.project_id = '{project}'
                AND destination_table.dataset_id = '{dataset}'
                AND destination_table.table_id = '{table}'
                AND creation_time > TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)
                AND statement_type IN ({statement_types})
                LIMIT {limit}
                "#,
                location = location,
                project = quote(&t.project),
                dataset = quote(&t.dataset),
                table = quote(&t.table),
                days = self.lookback_days,
                statement_types = statement_types,
                limit = self.limit,
            ),
            ReferenceSide::Destinations => format!(
                r#"
                SELECT DISTINCT
                    destination_table.project_id AS project_id,
                    destination_table.dataset_id AS dataset_id,
                    destination_table.table_id AS table_id
                FROM `{location}`.INFORMATION_SCHEMA.JOBS_BY_PROJECT,
                UNNEST(referenced_tables) AS referenced_table
                WHERE referenced_table.project_id = '{project}'
                AND referenced_table.dataset_id = '{dataset}'
                AND referenced_table.table_id = '{table}'
                AND destination_table.table_id IS NOT NULL
                AND NOT (
                    destination_table.project_id = '{project}'
                    AND destination_table.dataset_id = '{dataset}'
                    AND destination_table.table_id = '{table}'
                )
                AND creation_time > TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)
                AND statement_type IN ({statement_types})
                LIMIT {limit}
                "#,
                location = location,
                project = quote(&t.project),
                dataset = quote(&t.dataset),
                table = quote(&t.table),
                days = self.lookback_days,
                statement_types = statement_types,
                limit = self.limit,
            ),
        }
    }

    /// Evaluate against an in-memory job log
    pub fn evaluate(&self, jobs: &[JobRecord], now: DateTime<Utc>) -> Vec<TableIdentifier> {
        let cutoff = now - Duration::days(i64::from(self.lookback_days));
        let types = self.statement_types();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        let candidates = jobs
            .iter()
            .filter(|job| job.creation_time > cutoff)
            .filter(|job| types.contains(&job.statement_type.as_str()));

        for job in candidates {
            let linked: Vec<&TableIdentifier> = match self.side {
                ReferenceSide::Sources => {
                    if job.destination.as_ref() != Some(&self.table) {
                        continue;
                    }
                    job.referenced_tables.iter().collect()
                }
                ReferenceSide::Destinations => {
                    if !job.referenced_tables.contains(&self.table) {
                        continue;
                    }
                    job.destination
                        .iter()
                        .filter(|dest| **dest != self.table)
                        .collect()
                }
            };

            for table in linked {
                if found.len() >= self.limit as usize {
                    return found;
                }
                if seen.insert(table.clone()) {
                    found.push(table.clone());
                }
            }
        }

        found
    }
}

/// Recently failed jobs touching a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureQuery {
    pub table: TableIdentifier,
    pub hours: u32,
    pub limit: u32,
}

impl FailureQuery {
    pub fn new(table: TableIdentifier, hours: u32, limit: u32) -> Self {
        Self { table, hours, limit }
    }

    /// Render against the table's project JOBS_BY_PROJECT view
    pub fn to_sql(&self, location: &str) -> String {
        let t = &self.table;
        format!(
            r#"
            SELECT
                job_id,
                UNIX_MILLIS(creation_time) AS creation_ms,
                error_result.reason AS error_reason,
                error_result.message AS error_message
            FROM `{project}`.`{location}`.INFORMATION_SCHEMA.JOBS_BY_PROJECT
            WHERE creation_time >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {hours} HOUR)
            AND state = 'DONE'
            AND error_result IS NOT NULL
            AND (
                LOWER(query) LIKE '%{needle}%'
                OR destination_table.table_id = '{table}'
            )
            ORDER BY creation_time DESC
            LIMIT {limit}
            "#,
            project = t.project,
            location = location,
            hours = self.hours,
            needle = quote(&self.needle()),
            table = quote(&t.table),
            limit = self.limit,
        )
    }

    /// Text searched for in the job's query
    fn needle(&self) -> String {
        format!("{}.{}", self.table.dataset, self.table.table).to_lowercase()
    }

    /// Evaluate against an in-memory job log
    pub fn evaluate(&self, jobs: &[JobRecord], now: DateTime<Utc>) -> Vec<JobFailure> {
        let cutoff = now - Duration::hours(i64::from(self.hours));
        let needle = self.needle();

        let mut failed: Vec<&JobRecord> = jobs
            .iter()
            .filter(|job| job.error.is_some() && job.creation_time >= cutoff)
            .filter(|job| {
                job.query.to_lowercase().contains(&needle)
                    || job.destination.as_ref().map(|d| d.table.as_str()) == Some(self.table.table.as_str())
            })
            .collect();

        failed.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        failed
            .into_iter()
            .take(self.limit as usize)
            .map(JobFailure::from)
            .collect()
    }
}

/// The job that produced a lineage edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeJobQuery {
    pub source: TableIdentifier,
    pub target: TableIdentifier,
    pub lookback_days: u32,
}

impl EdgeJobQuery {
    pub fn new(source: TableIdentifier, target: TableIdentifier, lookback_days: u32) -> Self {
        Self {
            source,
            target,
            lookback_days,
        }
    }

    pub fn to_sql(&self, location: &str) -> String {
        let (s, t) = (&self.source, &self.target);
        format!(
            r#"
            SELECT
                job_id,
                UNIX_MILLIS(creation_time) AS creation_ms,
                statement_type,
                user_email,
                query,
                total_bytes_processed
            FROM `{location}`.INFORMATION_SCHEMA.JOBS_BY_PROJECT
            WHERE destination_table.project_id = '{tp}'
            AND destination_table.dataset_id = '{td}'
            AND destination_table.table_id = '{tt}'
            AND EXISTS (
                SELECT 1 FROM UNNEST(referenced_tables) AS referenced_table
                WHERE referenced_table.project_id = '{sp}'
                AND referenced_table.dataset_id = '{sd}'
                AND referenced_table.table_id = '{st}'
            )
            AND creation_time > TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)
            AND error_result IS NULL
            ORDER BY creation_time DESC
            LIMIT 1
            "#,
            location = location,
            tp = quote(&t.project),
            td = quote(&t.dataset),
            tt = quote(&t.table),
            sp = quote(&s.project),
            sd = quote(&s.dataset),
            st = quote(&s.table),
            days = self.lookback_days,
        )
    }

    pub fn evaluate(&self, jobs: &[JobRecord], now: DateTime<Utc>) -> Option<JobRecord> {
        let cutoff = now - Duration::days(i64::from(self.lookback_days));
        jobs.iter()
            .filter(|job| job.error.is_none() && job.creation_time > cutoff)
            .filter(|job| job.destination.as_ref() == Some(&self.target))
            .filter(|job| job.referenced_tables.contains(&self.source))
            .max_by_key(|job| job.creation_time)
            .cloned()
    }
}

/// Escape a string literal for inclusion in single quotes
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn sql_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", quote(v)))
        .collect::<Vec<_>>()
        .join(", ")
}
