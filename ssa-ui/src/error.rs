//! Error types for ssa-ui

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The session has no dataset bound (404)
    #[error("No dataset is active for this session")]
    NoActiveDataset,

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Engine error
    #[error(transparent)]
    Common(#[from] ssa_common::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        use ssa_common::Error as E;
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NoActiveDataset => (StatusCode::NOT_FOUND, "NO_ACTIVE_DATASET"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(err) => {
                let status = match err {
                    E::NotFound(_) => StatusCode::NOT_FOUND,
                    E::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    E::MissingRequiredFile { .. }
                    | E::MissingRequiredColumn { .. }
                    | E::UnsupportedExportVersion { .. }
                    | E::UnparsableRow { .. }
                    | E::EmptyDataset { .. }
                    | E::Csv { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    E::Io(_) | E::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
