//! Service- and application-level error taxonomy.
//!
//! `StateMismatch` (stale expected-id on advance) is deliberately absent
//! here: it is not an error but the idempotency mechanism, reported inside
//! the discriminated success payload with the authoritative state attached.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::{migrate::MigrationError, storage::StorageError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend failed while serving the operation.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Missing or incorrect admin/identity credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested room/entry/identity was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflicting state (duplicate join, duplicate room, claimed name).
    #[error("conflict: {0}")]
    Conflict(String),
    /// The caller exhausted a rate-limit window.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The external search upstream failed or timed out.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Unexpected internal failure; must never crash the process.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<MigrationError> for ServiceError {
    fn from(err: MigrationError) -> Self {
        ServiceError::Internal(format!("schema migration failed: {err}"))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input (400).
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state (409).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Rate-limit window exhausted (429).
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// External collaborator failed (502).
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
    /// Service unavailable or degraded (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::RateLimited(message) => AppError::RateLimited(message),
            ServiceError::Upstream(message) => AppError::UpstreamFailure(message),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
