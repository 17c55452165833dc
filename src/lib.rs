//! HR Auth Service Library
//!
//! Authentication and session management for the HR management backend:
//! registration with email verification, login by email or username, JWT
//! access and refresh tokens with rotation, server-side sessions, password
//! change and reset, and account lockout after repeated failures.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hr_auth_service::{
//!     api::{AppState, RouterBuilder},
//!     config::AppConfig,
//!     repository::{PgSessionRepository, PgUserRepository},
//!     service::{AuthServices, InMemoryCache, LogEventSink},
//!     utils::clock::SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let pool = config.database.create_pool().await?;
//!     let clock = Arc::new(SystemClock);
//!
//!     let services = AuthServices::build(
//!         Arc::new(PgUserRepository::new(pool.clone())),
//!         Arc::new(PgSessionRepository::new(pool)),
//!         Some(Arc::new(InMemoryCache::new(clock.clone()))),
//!         &config,
//!         clock,
//!         Arc::new(LogEventSink),
//!     );
//!
//!     // Accounts are provisioned by HR: no self-registration
//!     let state = AppState::from(&services);
//!     let app = RouterBuilder::with_session_routes()
//!         .build(&state)
//!         .with_state(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **API Layer**: HTTP handlers, bearer middleware and the route builder
//! - **Service Layer**: authentication flows, tokens, sessions and user lookups
//! - **Repository**: storage traits with PostgreSQL and in-memory implementations
//! - **Models**: records, API shapes and token claims
//! - **Utils**: errors, password hashing, validation rules and the clock

/// HTTP API layer with handlers and configurable routing
pub mod api;

/// Configuration loaded from the environment
pub mod config;

/// Database connection management and migrations
pub mod database;

/// Data models and request/response structures
pub mod models;

/// User and session storage
pub mod repository;

/// Authentication, token and session services
pub mod service;

/// Shared utilities for security, validation, and error handling
pub mod utils;

// Re-export commonly used types for convenient access
pub use api::{create_routes, AppState, RouterBuilder};
pub use config::{AppConfig, AuthConfig, CacheConfig, JwtConfig, ServerConfig};
pub use database::{DatabaseConfig, DatabasePool};
pub use models::{AuthResponse, SessionInfo, TokenPair, User, UserContext, UserStatus};
pub use service::{AuthServices, AuthenticationService, SessionService, TokenService, UserService};
pub use utils::error::{AppError, AppResult, ErrorResponse};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
