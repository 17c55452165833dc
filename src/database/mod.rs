//! Database Module
//!
//! Connection pool setup and migrations for the auth service.

pub mod connection;

pub use connection::{run_migrations, DatabaseConfig, DatabasePool};
