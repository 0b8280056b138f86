//! API error responses.
//!
//! Maps domain errors onto HTTP statuses and a stable JSON body shape:
//! `{"error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conveyor_core::CoreError;
use conveyor_queue::AdmissionError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message.
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Admission rejected or failed the submission.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Storage failure outside admission.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Malformed request parameter.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Admission(AdmissionError::MissingCallbackUrl) => {
                (StatusCode::BAD_REQUEST, "missing_callback_url")
            },
            Self::Admission(AdmissionError::SyncLimitExceeded { .. }) => {
                (StatusCode::BAD_REQUEST, "sync_limit_exceeded")
            },
            Self::Admission(AdmissionError::Generator(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed")
            },
            Self::Admission(AdmissionError::QueueClosed) => {
                (StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable")
            },
            Self::Admission(AdmissionError::Storage(core)) => core_status(core),
            Self::Core(core) => core_status(core),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_parameter"),
        }
    }
}

fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::ConstraintViolation(_) => (StatusCode::CONFLICT, "conflict"),
        CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        CoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail { code: code.to_string(), message: self.to_string() },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_map_to_client_statuses() {
        let (status, code) =
            ApiError::Admission(AdmissionError::MissingCallbackUrl).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "missing_callback_url");

        let (status, _) =
            ApiError::Admission(AdmissionError::SyncLimitExceeded { limit: 50 }).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_errors_map_by_kind() {
        let (status, _) = ApiError::Core(CoreError::NotFound("x".into())).status_and_code();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = ApiError::Core(CoreError::Database("down".into())).status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
