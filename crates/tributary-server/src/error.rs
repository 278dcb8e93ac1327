//! HTTP mapping of service errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tributary_cache::CacheError;
use tributary_catalog::FetchError;
use tributary_core::ServiceError;

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Upstream(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match &self.0 {
            ServiceError::Forbidden(_) => "access denied".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        Self(err.into())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.0.is_client_error() {
            tracing::error!(error = ?self.0, "request failed");
        } else if let ServiceError::Forbidden(detail) = &self.0 {
            tracing::warn!(detail = %detail, "access denied");
        }

        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
