//! Service-level error taxonomy
//!
//! Cache unavailability and partial discovery failures never appear here:
//! the former degrades to the source of truth, the latter is logged and
//! dropped from results.

/// Errors surfaced to callers of the catalog service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Detail is kept for logs only; callers see a fixed message
    #[error("Access denied")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the error was caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Forbidden(_) | Self::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_does_not_leak_detail() {
        let err = ServiceError::Forbidden("user x lacks bigquery.jobs.list on proj".into());
        assert_eq!(err.to_string(), "Access denied");
    }

    #[test]
    fn classifies_client_errors() {
        assert!(ServiceError::InvalidInput("bad".into()).is_client_error());
        assert!(!ServiceError::Upstream("boom".into()).is_client_error());
    }
}
