//! Error Handling Utilities
//!
//! The single error taxonomy for the auth service and its mapping onto HTTP
//! status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use validator::ValidationErrors;

use crate::utils::validation::field_error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Aggregated validation failures for user input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    /// Bad credentials, invalid tokens, locked or disabled accounts
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but lacking the required role or permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Business rule violations (bad reset token, wrong current password)
    #[error("Business rule violation: {0}")]
    Business(String),

    /// Malformed requests that fail before reaching business logic
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Duplicate email or username
    #[error("Conflict on {field}: {message}")]
    Conflict { message: String, field: String },

    /// Generic internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Password hashing errors
    #[error("Password hashing error: {0}")]
    HashingError(#[from] bcrypt::BcryptError),
}

impl AppError {
    pub fn unauthorized(message: &str) -> Self {
        AppError::Unauthorized(message.to_string())
    }

    pub fn business(message: &str) -> Self {
        AppError::Business(message.to_string())
    }

    pub fn conflict(message: &str, field: &str) -> Self {
        AppError::Conflict {
            message: message.to_string(),
            field: field.to_string(),
        }
    }

    /// Validation failure for a single field
    pub fn validation(field: &'static str, message: &'static str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, field_error("invalid", message));
        AppError::Validation(errors)
    }
}

/// Ok when nothing was recorded, otherwise a validation error carrying everything
pub fn check_validation(errors: ValidationErrors) -> AppResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Field name to messages, in field order, as clients receive it in `details`
///
/// Errors raised without a message fall back to their code.
pub fn validation_details(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| error.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

/// Standard error response structure for API endpoints
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(error: &str, message: &str, details: serde_json::Value) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            details: Some(details),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::with_details(
                    "VALIDATION_ERROR",
                    "Validation failed",
                    serde_json::to_value(validation_details(&errors)).unwrap_or_default(),
                ),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("UNAUTHORIZED", &msg),
            ),
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, ErrorResponse::new("FORBIDDEN", &msg))
            }
            AppError::Business(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("BUSINESS_ERROR", &msg),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("BAD_REQUEST", &msg),
            ),
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new("NOT_FOUND", &msg))
            }
            AppError::Conflict { message, field } => (
                StatusCode::CONFLICT,
                ErrorResponse::with_details(
                    "CONFLICT",
                    &message,
                    serde_json::json!({ "field": field }),
                ),
            ),
            AppError::Database(e) => {
                log::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("DATABASE_ERROR", "A database error occurred"),
                )
            }
            AppError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", "An internal server error occurred"),
                )
            }
            AppError::Configuration(detail) => {
                log::error!("Configuration error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("CONFIGURATION_ERROR", "Server configuration error"),
                )
            }
            AppError::HashingError(e) => {
                log::error!("Password hashing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", "An internal server error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for operations that can return AppError
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting other error types to AppError
pub trait IntoAppError<T> {
    fn into_app_error(self, context: &str) -> AppResult<T>;
}

impl<T, E> IntoAppError<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn into_app_error(self, context: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }
}
