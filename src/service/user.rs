//! User Service Implementation
//!
//! Account lookups and account-record updates. Lookups by id go through the
//! optional cache; every update goes through here so the cached copy is
//! invalidated in one place.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{NewUser, UserRecord, UserStatus};
use crate::repository::{LockoutPolicy, UserRepository};
use crate::service::cache::Cache;
use crate::utils::clock::Clock;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::{normalize_email, normalize_username};

/// Default lifetime of a cached user record
pub const DEFAULT_USER_CACHE_TTL_SECONDS: i64 = 300;

fn cache_key(id: Uuid) -> String {
    format!("user:{}", id)
}

/// User account operations shared by the auth services and the admin CLI
pub struct UserService {
    users: Arc<dyn UserRepository>,
    cache: Option<Arc<dyn Cache>>,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    lockout: LockoutPolicy,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            users,
            cache: None,
            cache_ttl: Duration::seconds(DEFAULT_USER_CACHE_TTL_SECONDS),
            clock,
            lockout: LockoutPolicy::default(),
        }
    }

    /// Serve `find_by_id` from `cache` for up to `ttl`
    pub fn with_cache(mut self, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        self.lockout
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Look up a user by id, consulting the cache first
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UserRecord>> {
        if let Some(user) = self.cached(id).await {
            return Ok(Some(user));
        }

        let user = self.users.find_by_id(id).await?;
        if let Some(user) = &user {
            self.store_in_cache(user).await;
        }
        Ok(user)
    }

    /// Like `find_by_id` but a missing user is `NotFound`
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<UserRecord> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        self.users.find_by_email(&normalize_email(email)).await
    }

    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        self.users.find_by_username(&normalize_username(username)).await
    }

    /// Login lookup; the identifier is normalized the same way for both columns
    pub async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.users
            .find_by_email_or_username(&normalize_email(identifier))
            .await
    }

    pub async fn find_by_password_reset_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.users.find_by_password_reset_token(token_hash).await
    }

    pub async fn find_by_email_verification_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.users.find_by_email_verification_token(token_hash).await
    }

    /// Insert a user, normalizing email and username
    pub async fn create(&self, mut user: NewUser) -> AppResult<UserRecord> {
        user.email = normalize_email(&user.email);
        user.username = normalize_username(&user.username);
        self.users.create(user, self.now()).await
    }

    pub async fn set_password_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let user = self
            .users
            .set_password_reset_token(id, token_hash, expires_at, self.now())
            .await?;
        self.invalidate(id).await;
        Ok(user)
    }

    pub async fn set_email_verification_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<UserRecord> {
        let user = self
            .users
            .set_email_verification_token(id, token_hash, expires_at, self.now())
            .await?;
        self.invalidate(id).await;
        Ok(user)
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> AppResult<UserRecord> {
        let user = self
            .users
            .update_password(id, password_hash, self.now())
            .await?;
        self.invalidate(id).await;
        Ok(user)
    }

    pub async fn mark_email_verified(&self, id: Uuid) -> AppResult<UserRecord> {
        let user = self.users.mark_email_verified(id, self.now()).await?;
        self.invalidate(id).await;
        Ok(user)
    }

    pub async fn record_login_success(&self, id: Uuid) -> AppResult<UserRecord> {
        let user = self.users.record_login_success(id, self.now()).await?;
        self.invalidate(id).await;
        Ok(user)
    }

    /// Count a failed password check under the configured lockout policy
    pub async fn record_login_failure(&self, id: Uuid) -> AppResult<UserRecord> {
        let user = self
            .users
            .record_login_failure(id, self.now(), self.lockout)
            .await?;
        self.invalidate(id).await;
        Ok(user)
    }

    pub async fn clear_lockout(&self, id: Uuid) -> AppResult<UserRecord> {
        let user = self.users.clear_lockout(id, self.now()).await?;
        self.invalidate(id).await;
        Ok(user)
    }

    pub async fn set_status(&self, id: Uuid, status: UserStatus) -> AppResult<UserRecord> {
        let user = self.users.set_status(id, status, self.now()).await?;
        self.invalidate(id).await;
        log::info!("User {} status set to {}", id, status.as_str());
        Ok(user)
    }

    pub async fn health_check(&self) -> AppResult<()> {
        self.users.health_check().await
    }

    async fn cached(&self, id: Uuid) -> Option<UserRecord> {
        let cache = self.cache.as_ref()?;
        match cache.get(&cache_key(id)).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(user) => Some(user),
                Err(e) => {
                    log::warn!("Discarding unreadable cached user {}: {}", id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("User cache read failed for {}: {}", id, e);
                None
            }
        }
    }

    async fn store_in_cache(&self, user: &UserRecord) {
        let Some(cache) = &self.cache else {
            return;
        };
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize user {} for cache: {}", user.id, e);
                return;
            }
        };
        if let Err(e) = cache.set(&cache_key(user.id), json, self.cache_ttl).await {
            log::warn!("User cache write failed for {}: {}", user.id, e);
        }
    }

    async fn invalidate(&self, id: Uuid) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(&cache_key(id)).await {
                log::warn!("User cache invalidation failed for {}: {}", id, e);
            }
        }
    }
}
