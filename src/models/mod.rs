//! Data Models Module
//!
//! User and session records, token claims and request/response payloads.

pub mod auth;
pub mod requests;
pub mod session;
pub mod user;

// Re-export commonly used types
pub use auth::*;
pub use requests::*;
pub use session::*;
pub use user::*;
