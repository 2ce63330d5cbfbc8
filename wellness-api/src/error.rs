//! Error Types for the Wellness API
//!
//! - `ApiError` is the structured JSON error body
//! - `ErrorCode` categorizes it and picks the HTTP status
//! - `From<WellnessError>` maps domain failures onto codes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use wellness_core::{BrokerError, StorageError, ValidationError, WellnessError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested client does not exist
    ClientNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// A client with the same unique field already exists
    ClientAlreadyExists,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// A backing service is temporarily unavailable
    ServiceUnavailable,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::ClientNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ClientAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::ClientNotFound => "Client not found",
            ErrorCode::ClientAlreadyExists => "Client already exists",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn client_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ClientNotFound, format!("Client {} not found", id))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            other => ApiError::validation_failed(other.to_string()),
        }
    }
}

impl From<WellnessError> for ApiError {
    fn from(err: WellnessError) -> Self {
        match err {
            WellnessError::Validation(e) => e.into(),
            WellnessError::Storage(StorageError::NotFound { id, .. }) => {
                ApiError::client_not_found(id)
            }
            WellnessError::Storage(e @ StorageError::Conflict { .. }) => {
                ApiError::new(ErrorCode::ClientAlreadyExists, e.to_string())
            }
            WellnessError::Storage(StorageError::Unavailable { store, reason }) => {
                tracing::error!(store = %store, reason = %reason, "Backing store unavailable");
                ApiError::service_unavailable(format!("{} unavailable", store))
            }
            WellnessError::Storage(e) => {
                // Full detail goes to the log only.
                tracing::error!(error = %e, "Storage operation failed");
                ApiError::from_code(ErrorCode::InternalError)
            }
            WellnessError::Broker(BrokerError::Timeout { .. }) => {
                ApiError::from_code(ErrorCode::Timeout)
            }
            WellnessError::Broker(e) => {
                tracing::error!(error = %e, "Broker operation failed");
                ApiError::from_code(ErrorCode::ServiceUnavailable)
            }
            other => {
                tracing::error!(error = %other, "Unexpected error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
