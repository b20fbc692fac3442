use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Quantity exceeded: {0}")]
    QuantityExceeded(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Inactive: {0}")]
    Inactive(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Ticket code generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::QuantityExceeded(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidReference(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Inactive(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::CapacityExceeded(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::ConcurrencyConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::GenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::QuantityExceeded(_) => "QUANTITY_EXCEEDED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidReference(_) => "INVALID_REFERENCE",
            AppError::Inactive(_) => "INACTIVE",
            AppError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            AppError::GenerationFailed(_) => "GENERATION_FAILED",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Only a store-level contention abort may be retried; every other failure is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict(_))
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::GenerationFailed(msg)
            | AppError::Timeout(msg)
            | AppError::InternalServerError(msg) => {
                error!(code = self.code(), message = %msg, "Application error");
            }
            AppError::ValidationError(msg)
            | AppError::QuantityExceeded(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidReference(msg)
            | AppError::Inactive(msg)
            | AppError::CapacityExceeded(msg)
            | AppError::InvalidTransition(msg)
            | AppError::ConcurrencyConflict(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            AppError::ValidationError(msg)
            | AppError::QuantityExceeded(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidReference(msg)
            | AppError::Inactive(msg)
            | AppError::CapacityExceeded(msg)
            | AppError::GenerationFailed(msg)
            | AppError::InvalidTransition(msg)
            | AppError::ConcurrencyConflict(msg)
            | AppError::Timeout(msg) => msg.clone(),
        };

        error_response(code, public_message, None, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_concurrency_conflict_is_retryable() {
        assert!(AppError::ConcurrencyConflict("serialization failure".into()).is_retryable());
        assert!(!AppError::CapacityExceeded("sold out".into()).is_retryable());
        assert!(!AppError::GenerationFailed("exhausted".into()).is_retryable());
    }

    #[test]
    fn test_status_codes_for_allocation_failures() {
        assert_eq!(
            AppError::CapacityExceeded("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::QuantityExceeded("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidReference("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::ConcurrencyConflict("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_database_details_are_hidden() {
        let response = AppError::DatabaseError(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
