use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::models::ErrorResponse;

/// API error types with proper HTTP status mapping
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to resolve formats: {0}")]
    ResolutionFailed(String),

    #[error("Task is not finished or does not exist")]
    NotReady,

    #[error("Downloaded file is missing from storage")]
    FileMissing,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::ResolutionFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotReady => StatusCode::NOT_FOUND,
            ApiError::FileMissing => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidUrl(_) => "INVALID_URL",
            ApiError::ResolutionFailed(_) => "RESOLUTION_FAILED",
            ApiError::NotReady => "NOT_READY",
            ApiError::FileMissing => "FILE_MISSING",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
