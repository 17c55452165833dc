//! Utilities Module
//!
//! Shared utilities for error handling, hashing, validation and time used
//! throughout the auth service.

pub mod clock;
pub mod error;
pub mod security;
pub mod validation;

// Re-export commonly used utilities
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{check_validation, validation_details, AppError, AppResult, ErrorResponse};
pub use security::*;
pub use validation::*;
