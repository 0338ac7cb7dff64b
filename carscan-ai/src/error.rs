//! Error types for carscan-ai HTTP handlers

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::orchestrator::AnalysisError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Analysis could not produce a verdict (500)
    #[error("{message}: {cause}")]
    AnalysisFailed { message: String, cause: String },

    /// Verdict computed but not stored (500)
    #[error("Failed to save analysis: {0}")]
    PersistenceFailed(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, cause) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::AnalysisFailed { message, cause } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ANALYSIS_FAILED",
                message,
                Some(cause),
            ),
            ApiError::PersistenceFailed(cause) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SAVE_FAILED",
                "Failed to save analysis".to_string(),
                Some(cause),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
                None,
            ),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(cause) = cause {
            error["cause"] = json!(cause);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<carscan_common::Error> for ApiError {
    fn from(err: carscan_common::Error) -> Self {
        match err {
            carscan_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            carscan_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::PrimaryAnalyzerFailed { analyzer, cause } => ApiError::AnalysisFailed {
                message: "Primary analyzer failed".to_string(),
                cause: format!("{}: {}", analyzer, cause),
            },
            AnalysisError::Persistence(e) => ApiError::PersistenceFailed(e.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
