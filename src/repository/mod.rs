//! Store Interfaces
//!
//! The auth services reach the relational store only through these traits.
//! `postgres` holds the sqlx implementations used by the server, `memory`
//! holds in-process implementations for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{NewSession, NewUser, Session, UserRecord, UserStatus};
use crate::utils::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::{InMemorySessionRepository, InMemoryUserRepository};
pub use postgres::{PgSessionRepository, PgUserRepository};

/// Failed-login lockout thresholds applied by the account-record update path
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    /// Cumulative failures at which the account locks
    pub max_attempts: i32,
    /// How long a lockout lasts
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_duration: Duration::minutes(30),
        }
    }
}

/// Persisted user accounts
///
/// Email and username arguments are expected to be normalized already.
/// Update methods fail with `NotFound` when the row does not exist.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; duplicate email or username is a field-scoped `Conflict`
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> AppResult<UserRecord>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UserRecord>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;

    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>>;

    async fn find_by_email_or_username(&self, identifier: &str)
        -> AppResult<Option<UserRecord>>;

    async fn find_by_password_reset_token(&self, token_hash: &str)
        -> AppResult<Option<UserRecord>>;

    async fn find_by_email_verification_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>>;

    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord>;

    async fn set_email_verification_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord>;

    /// Store a new password hash and clear any outstanding reset token
    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord>;

    /// Mark the email verified, clear the verification token and activate the account
    async fn mark_email_verified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord>;

    /// Stamp the login time and reset the failure counter and lockout
    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord>;

    /// Count a failed password check, locking the account once the policy threshold is reached
    async fn record_login_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> AppResult<UserRecord>;

    /// Reset the failure counter and lift any lockout without touching the login stamp
    async fn clear_lockout(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord>;

    async fn set_status(
        &self,
        id: Uuid,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord>;

    /// Check that the store is reachable
    async fn health_check(&self) -> AppResult<()>;
}

/// Persisted sessions keyed by refresh-token digest
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session; a duplicate token digest is a `Conflict`
    async fn create(&self, session: NewSession) -> AppResult<Session>;

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Session>>;

    /// Update last activity
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()>;

    async fn deactivate(&self, id: Uuid) -> AppResult<()>;

    /// Deactivate every session of the user, optionally sparing one token digest
    async fn deactivate_all_for_user(
        &self,
        user_id: Uuid,
        except_token_hash: Option<&str>,
    ) -> AppResult<u64>;

    /// Deactivate every active session in a rotation lineage
    async fn deactivate_family(&self, token_family: Uuid) -> AppResult<u64>;

    /// Retire `old_id` and insert `replacement` as one unit of work
    ///
    /// The old row is retired only if it is still active; `None` means another
    /// caller got there first and nothing was written.
    async fn rotate(&self, old_id: Uuid, replacement: NewSession) -> AppResult<Option<Session>>;

    /// Active, unexpired sessions of a user, most recent activity first
    async fn find_active_by_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> AppResult<Vec<Session>>;

    async fn count_active_by_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<i64>;

    /// Physically remove sessions with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
