//! API Layer
//!
//! HTTP API endpoints and request handling for the authentication service.

pub mod handlers;
pub mod middleware;
pub mod routes;

// Re-export commonly used types
pub use handlers::{AppState, SuccessResponse};
pub use middleware::{auth_middleware, bearer_token, require_permissions, require_roles, AuthUser};
pub use routes::{create_routes, RouterBuilder};
