//! Centralized API error handling
//!
//! One error type for the whole HTTP surface, with status-code mapping and
//! JSON bodies. Domain refusals that callers are expected to branch on
//! (admission queued/rejected, duplicate registration) are modeled as typed
//! results in the services, not as variants here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Member not eligible: {0}")]
    Ineligible(String),

    #[error("Consent token expired or invalid: {0}")]
    ConsentInvalid(String),

    #[error("Lending period is closed: {0}")]
    PeriodClosed(String),

    #[error("Monthly lending capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("Concurrent update conflict on {0}")]
    ConcurrencyConflict(String),

    #[error("Reconciliation mismatch: {0}")]
    ReconciliationMismatch(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Ineligible(_) => "INELIGIBLE",
            ApiError::ConsentInvalid(_) => "CONSENT_EXPIRED_OR_INVALID",
            ApiError::PeriodClosed(_) => "PERIOD_CLOSED",
            ApiError::CapacityExhausted(_) => "CAPACITY_EXHAUSTED",
            ApiError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ApiError::ReconciliationMismatch(_) => "RECONCILIATION_MISMATCH",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ConsentInvalid(_) => StatusCode::CONFLICT,
            ApiError::PeriodClosed(_) => StatusCode::CONFLICT,
            ApiError::CapacityExhausted(_) => StatusCode::CONFLICT,
            ApiError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            ApiError::ReconciliationMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Only infrastructure failures are server errors; domain refusals
        // are logged at debug level.
        match &self {
            ApiError::Internal(_) | ApiError::Database(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Request refused");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<csv::Error> for ApiError {
    fn from(err: csv::Error) -> Self {
        ApiError::Validation(format!("Malformed CSV: {}", err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

/// True when a database error is a serialization failure or deadlock that
/// is safe to retry (Postgres SQLSTATE 40001 / 40P01).
pub fn is_retryable(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ApiError::PeriodClosed("2026-02".to_string()).error_code(),
            "PERIOD_CLOSED"
        );
        assert_eq!(
            ApiError::CapacityExhausted("2026-02".to_string()).error_code(),
            "CAPACITY_EXHAUSTED"
        );
        assert_eq!(
            ApiError::ConsentInvalid("token".to_string()).error_code(),
            "CONSENT_EXPIRED_OR_INVALID"
        );
        assert_eq!(
            ApiError::Validation("bad".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Ineligible("savings".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::CapacityExhausted("2026-02".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Database("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
