//! Table identity
//!
//! Every table the service talks about is addressed by a
//! `project.dataset.table` triple. The joined form is the identity key used
//! by lineage nodes, edges and cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::ServiceError;

/// Identifies a table in the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableIdentifier {
    /// Project name
    pub project: String,

    /// Dataset name
    pub dataset: String,

    /// Table name
    pub table: String,
}

fn segment_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    // Project ids carry dashes, partition decorators carry `$`
    PATTERN.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_\-$]+$").expect("static regex"))
}

impl TableIdentifier {
    /// Create a new table identifier without validation
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Create a table identifier, rejecting empty or malformed segments
    pub fn validated(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let id = Self::new(project, dataset, table);
        id.validate()?;
        Ok(id)
    }

    /// Parse a dotted `project.dataset.table` string
    pub fn parse(fqn: &str) -> Result<Self, ServiceError> {
        let parts: Vec<&str> = fqn.split('.').collect();
        if parts.len() != 3 {
            return Err(ServiceError::InvalidInput(format!(
                "'{}' is not a fully qualified table name (expected project.dataset.table)",
                fqn
            )));
        }
        Self::validated(parts[0], parts[1], parts[2])
    }

    /// Check every segment against the identifier grammar
    pub fn validate(&self) -> Result<(), ServiceError> {
        for (label, value) in [
            ("project", &self.project),
            ("dataset", &self.dataset),
            ("table", &self.table),
        ] {
            if value.is_empty() {
                return Err(ServiceError::InvalidInput(format!("{} must not be empty", label)));
            }
            if !segment_pattern().is_match(value) {
                return Err(ServiceError::InvalidInput(format!(
                    "{} '{}' contains characters outside [A-Za-z0-9_-$]",
                    label, value
                )));
            }
        }
        Ok(())
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_identifier() {
        let table = TableIdentifier::new("my-project", "my_dataset", "my_table");
        assert_eq!(table.project, "my-project");
        assert_eq!(table.dataset, "my_dataset");
        assert_eq!(table.table, "my_table");
        assert_eq!(table.fqn(), "my-project.my_dataset.my_table");
        assert_eq!(table.to_string(), "my-project.my_dataset.my_table");
    }

    #[test]
    fn parse_round_trips_fqn() {
        let table = TableIdentifier::parse("proj.ds.orders").unwrap();
        assert_eq!(table, TableIdentifier::new("proj", "ds", "orders"));
    }

    #[test]
    fn parse_rejects_wrong_segment_count() {
        assert!(matches!(
            TableIdentifier::parse("proj.orders"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(TableIdentifier::parse("a.b.c.d").is_err());
    }

    #[test]
    fn rejects_empty_and_injected_segments() {
        assert!(TableIdentifier::validated("", "ds", "t").is_err());
        assert!(TableIdentifier::validated("p", "ds", "t' OR 1=1 --").is_err());
        assert!(TableIdentifier::validated("p", "ds", "events$20240101").is_ok());
    }
}
