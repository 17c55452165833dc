//! Request and Response Models
//!
//! Data structures for API request and response payloads with validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::validation::{
    email_validator, name_length_validator, required_name_validator, username_validator,
};

/// Request payload for registering a new account
///
/// Format rules are declared here; password strength and uniqueness are
/// added by the auth validator so every problem is reported together.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    #[validate(custom(function = "username_validator"))]
    pub username: String,

    pub password: String,

    #[validate(custom(function = "required_name_validator"))]
    pub first_name: String,

    #[validate(custom(function = "required_name_validator"))]
    pub last_name: String,

    #[serde(default)]
    #[validate(custom(function = "name_length_validator"))]
    pub middle_name: Option<String>,
}

/// Request payload for login by email or username
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email_or_username: String,
    pub password: String,
}

/// Request payload carrying a refresh token (refresh and logout)
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Request payload for changing the password of the signed-in user
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
    /// Refresh token of the session that should survive the change
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Request payload for starting a password reset
#[derive(Debug, Deserialize, Validate)]
pub struct RequestPasswordResetRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,
}

/// Request payload for completing a password reset
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

/// Request payload for email verification
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_middle_name_optional() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "username": "alice",
            "password": "Secur3!Pass",
            "first_name": "Alice",
            "last_name": "Smith"
        }))
        .unwrap();

        assert_eq!(request.username, "alice");
        assert!(request.middle_name.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_register_request_format_rules() {
        let request = RegisterRequest {
            email: "nope".to_string(),
            username: "alice".to_string(),
            password: "weak".to_string(),
            first_name: " ".to_string(),
            last_name: "Smith".to_string(),
            middle_name: Some("x".repeat(101)),
        };

        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("middle_name"));
        assert!(!fields.contains_key("username"));
        // Strength rules are applied by the auth validator, not the derive
        assert!(!fields.contains_key("password"));
    }

    #[test]
    fn test_password_reset_request_requires_valid_email() {
        let request = RequestPasswordResetRequest {
            email: "not-an-email".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_change_password_refresh_token_optional() {
        let request: ChangePasswordRequest = serde_json::from_value(serde_json::json!({
            "current_password": "Secur3!Pass",
            "new_password": "N3w!Secret",
            "confirm_password": "N3w!Secret"
        }))
        .unwrap();

        assert!(request.refresh_token.is_none());
    }
}
