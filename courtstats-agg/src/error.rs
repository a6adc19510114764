//! Error types for courtstats-agg HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courtstats_common::normalize::RowError;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// CSV parsed but produced no data rows (400, carries row diagnostics)
    #[error("CSV contains no data rows")]
    NoDataRows { parse_errors: Vec<RowError> },

    /// Missing or unknown credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Verified identity without admin privilege (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// courtstats-common error
    #[error(transparent)]
    Common(#[from] courtstats_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use courtstats_common::Error as CommonError;

        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) | ApiError::NoDataRows { .. } => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(CommonError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Common(CommonError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        let message = self.to_string();
        let body = match self {
            ApiError::NoDataRows { parse_errors } => json!({
                "error": message,
                "code": code,
                "parseErrors": parse_errors,
            }),
            _ => json!({
                "error": message,
                "code": code,
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
