use tributary_core::ServiceError;

/// Errors raised by cache stores and the cache layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// Only returned by invalidation; the pattern is not on the allow-list
    #[error("Invalid cache pattern '{0}'")]
    InvalidPattern(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidPattern(pattern) => ServiceError::InvalidInput(format!(
                "Invalid pattern '{}'. Allowed patterns: {}",
                pattern,
                crate::keys::allowed_patterns().join(", ")
            )),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}
