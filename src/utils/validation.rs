//! Validation Utilities
//!
//! Input rules shared by the registration and password flows, plus the
//! custom validators the request types plug into `validator`.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use validator::ValidationError;

/// Characters accepted as the "special character" of a strong password
pub const PASSWORD_SPECIAL_CHARS: &str = "@$!%*?&";

/// Minimum password length
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Maximum length of first, middle and last names
pub const NAME_MAX_LENGTH: usize = 100;

/// Validates email address format
pub fn validate_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    regex.is_match(email.trim())
}

/// Validates username format: 3-30 letters, digits, underscores or hyphens
pub fn validate_username(username: &str) -> bool {
    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_-]{3,30}$").expect("Failed to compile username regex")
    });

    regex.is_match(username.trim())
}

/// Normalizes email address to lowercase and removes whitespace
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalizes username to lowercase and removes whitespace
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Validation error with a machine-readable code and a user-facing message
pub fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Returns every strength rule the password violates; empty means strong
pub fn password_strength_errors(password: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.push(field_error("password_too_short", messages::PASSWORD_TOO_SHORT));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(field_error("password_no_lowercase", messages::PASSWORD_NO_LOWERCASE));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(field_error("password_no_uppercase", messages::PASSWORD_NO_UPPERCASE));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(field_error("password_no_digit", messages::PASSWORD_NO_DIGIT));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        errors.push(field_error("password_no_special", messages::PASSWORD_NO_SPECIAL));
    }

    errors
}

/// Custom validator for email fields using the validator crate
pub fn email_validator(email: &str) -> Result<(), ValidationError> {
    if validate_email(email) {
        Ok(())
    } else {
        Err(field_error("invalid_email", messages::INVALID_EMAIL))
    }
}

/// Custom validator for username fields using the validator crate
pub fn username_validator(username: &str) -> Result<(), ValidationError> {
    if validate_username(username) {
        Ok(())
    } else {
        Err(field_error("invalid_username", messages::INVALID_USERNAME))
    }
}

/// Custom validator for first and last names: present and not too long
pub fn required_name_validator(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(field_error("required", messages::FIELD_REQUIRED));
    }
    name_length_validator(name)
}

/// Custom validator for optional names, which only have a length limit
pub fn name_length_validator(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() > NAME_MAX_LENGTH {
        Err(field_error("too_long", messages::FIELD_TOO_LONG))
    } else {
        Ok(())
    }
}

/// Validation error messages for user-friendly responses
pub mod messages {
    pub const INVALID_EMAIL: &str = "Invalid email format";
    pub const EMAIL_TAKEN: &str = "Email already registered";
    pub const INVALID_USERNAME: &str =
        "Username must be 3-30 characters of letters, numbers, underscores and hyphens";
    pub const USERNAME_TAKEN: &str = "Username already taken";
    pub const FIELD_REQUIRED: &str = "This field is required";
    pub const FIELD_TOO_LONG: &str = "Maximum length is 100 characters";
    pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match";
    pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters long";
    pub const PASSWORD_NO_LOWERCASE: &str = "Password must contain at least one lowercase letter";
    pub const PASSWORD_NO_UPPERCASE: &str = "Password must contain at least one uppercase letter";
    pub const PASSWORD_NO_DIGIT: &str = "Password must contain at least one number";
    pub const PASSWORD_NO_SPECIAL: &str = "Password must contain at least one special character";
}
