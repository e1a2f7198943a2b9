//! Error types for ayu-bt
//!
//! Three layers:
//! - [`ValidationError`]: bad caller input, reported and re-prompted
//! - [`BatchError`]: everything a batch operation can fail with
//! - [`ApiError`]: HTTP mapping with `{error: {code, message}}` bodies

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::services::leaf_verifier::VerificationError;
use crate::workflow::state_machine::TransitionError;

/// Missing or invalid input at creation or submission time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors produced by batch operations
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Batch not found: {0}")]
    NotFound(Uuid),

    /// Caller's role may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Optimistic version check failed; the caller should re-read and retry
    #[error("Batch {0} was modified concurrently")]
    Conflict(Uuid),

    #[error(transparent)]
    Common(#[from] ayu_common::Error),
}

impl From<sqlx::Error> for BatchError {
    fn from(err: sqlx::Error) -> Self {
        BatchError::Common(ayu_common::Error::Database(err))
    }
}

pub type BatchResult<T> = Result<T, BatchError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing/unknown bearer token, or upstream rejected our session (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid request outside the domain validation (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Batch(BatchError::Validation(err))
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Batch(err) => batch_error_parts(err),
        }
    }
}

fn batch_error_parts(err: &BatchError) -> (StatusCode, &'static str) {
    match err {
        BatchError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        BatchError::Transition(e) => {
            let status = match e {
                TransitionError::BatchLocked { .. } => StatusCode::LOCKED,
                _ => StatusCode::CONFLICT,
            };
            (status, e.code())
        }
        BatchError::Verification(e) => {
            let status = match e {
                VerificationError::EmptyPhoto => StatusCode::BAD_REQUEST,
                VerificationError::VerificationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                VerificationError::InvalidVerificationResponse(_) => StatusCode::BAD_GATEWAY,
                VerificationError::SessionRejected(_) => StatusCode::UNAUTHORIZED,
                VerificationError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                VerificationError::UnsupportedCryptoBackend(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, e.code())
        }
        BatchError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        BatchError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        BatchError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        BatchError::Common(ayu_common::Error::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        }
        BatchError::Common(ayu_common::Error::InvalidInput(_)) => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST")
        }
        BatchError::Common(ayu_common::Error::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
        BatchError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
