//! In-memory stores with the same uniqueness rules as the Postgres schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{LockoutPolicy, SessionRepository, UserRepository};
use crate::models::{NewSession, NewUser, Session, UserRecord, UserStatus};
use crate::utils::error::{AppError, AppResult};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// User store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_where<F>(&self, predicate: F) -> Option<UserRecord>
    where
        F: Fn(&UserRecord) -> bool,
    {
        read(&self.users).values().find(|u| predicate(u)).cloned()
    }

    fn update<F>(&self, id: Uuid, now: DateTime<Utc>, apply: F) -> AppResult<UserRecord>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut users = write(&self.users);
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;
        apply(user);
        user.updated_at = now;
        Ok(user.clone())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> AppResult<UserRecord> {
        let mut users = write(&self.users);
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::conflict("Email already exists", "email"));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(AppError::conflict("Username already exists", "username"));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            middle_name: user.middle_name,
            role: user.role,
            status: user.status,
            email_verified: user.email_verified,
            email_verification_token: None,
            email_verification_expires: None,
            password_reset_token: None,
            password_reset_expires: None,
            last_login_at: None,
            login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UserRecord>> {
        Ok(read(&self.users).get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        Ok(self.find_where(|u| u.email == email))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        Ok(self.find_where(|u| u.username == username))
    }

    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> AppResult<Option<UserRecord>> {
        Ok(self.find_where(|u| u.email == identifier || u.username == identifier))
    }

    async fn find_by_password_reset_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>> {
        Ok(self.find_where(|u| u.password_reset_token.as_deref() == Some(token_hash)))
    }

    async fn find_by_email_verification_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>> {
        Ok(self.find_where(|u| u.email_verification_token.as_deref() == Some(token_hash)))
    }

    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.password_reset_token = Some(token_hash.to_string());
            u.password_reset_expires = Some(expires_at);
        })
    }

    async fn set_email_verification_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.email_verification_token = Some(token_hash.to_string());
            u.email_verification_expires = expires_at;
        })
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.password_hash = password_hash.to_string();
            u.password_reset_token = None;
            u.password_reset_expires = None;
        })
    }

    async fn mark_email_verified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.email_verified = true;
            u.email_verification_token = None;
            u.email_verification_expires = None;
            u.status = UserStatus::Active;
        })
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.last_login_at = Some(now);
            u.login_attempts = 0;
            u.locked_until = None;
        })
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.login_attempts += 1;
            if u.login_attempts >= policy.max_attempts {
                u.locked_until = Some(now + policy.lock_duration);
            }
        })
    }

    async fn clear_lockout(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord> {
        self.update(id, now, |u| {
            u.login_attempts = 0;
            u.locked_until = None;
        })
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        self.update(id, now, |u| u.status = status)
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Session store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows, active or not
    pub fn len(&self) -> usize {
        read(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(sessions: &mut HashMap<Uuid, Session>, new: NewSession) -> AppResult<Session> {
        if sessions.values().any(|s| s.token_hash == new.token_hash) {
            return Err(AppError::conflict("Session token already exists", "token_hash"));
        }

        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            token_hash: new.token_hash,
            token_family: new.token_family,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            is_active: true,
            rotated_at: None,
            expires_at: new.expires_at,
            last_activity: new.created_at,
            created_at: new.created_at,
        };
        sessions.insert(session.id, session.clone());
        Ok(session)
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: NewSession) -> AppResult<Session> {
        Self::insert(&mut write(&self.sessions), session)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Session>> {
        Ok(read(&self.sessions)
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(session) = write(&self.sessions).get_mut(&id) {
            session.last_activity = now;
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        if let Some(session) = write(&self.sessions).get_mut(&id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_all_for_user(
        &self,
        user_id: Uuid,
        except_token_hash: Option<&str>,
    ) -> AppResult<u64> {
        let mut count = 0;
        for session in write(&self.sessions).values_mut() {
            if session.user_id == user_id
                && session.is_active
                && Some(session.token_hash.as_str()) != except_token_hash
            {
                session.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn deactivate_family(&self, token_family: Uuid) -> AppResult<u64> {
        let mut count = 0;
        for session in write(&self.sessions).values_mut() {
            if session.token_family == token_family && session.is_active {
                session.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn rotate(&self, old_id: Uuid, replacement: NewSession) -> AppResult<Option<Session>> {
        // One lock for both steps so no reader sees a half-rotated state
        let mut sessions = write(&self.sessions);
        match sessions.get_mut(&old_id) {
            Some(old) if old.is_active => {
                old.is_active = false;
                old.rotated_at = Some(replacement.created_at);
            }
            _ => return Ok(None),
        }

        match Self::insert(&mut sessions, replacement) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                if let Some(old) = sessions.get_mut(&old_id) {
                    old.is_active = true;
                    old.rotated_at = None;
                }
                Err(e)
            }
        }
    }

    async fn find_active_by_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let mut active: Vec<Session> = read(&self.sessions)
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(active)
    }

    async fn count_active_by_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<i64> {
        Ok(read(&self.sessions)
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid(now))
            .count() as i64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = write(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_ROLE;
    use chrono::Duration;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: username.to_string(),
            password_hash: "hash".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            middle_name: None,
            role: DEFAULT_ROLE.to_string(),
            status: UserStatus::Pending,
            email_verified: false,
        }
    }

    fn new_session(user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id,
            token_hash: token_hash.to_string(),
            token_family: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_and_username_conflict() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("a@x.com", "alice"), Utc::now())
            .await
            .unwrap();

        match repo.create(new_user("a@x.com", "other"), Utc::now()).await {
            Err(AppError::Conflict { field, .. }) => assert_eq!(field, "email"),
            other => panic!("expected conflict, got {:?}", other),
        }
        match repo.create(new_user("b@x.com", "alice"), Utc::now()).await {
            Err(AppError::Conflict { field, .. }) => assert_eq!(field, "username"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_counter_locks_at_threshold() {
        let repo = InMemoryUserRepository::new();
        let now = Utc::now();
        let user = repo.create(new_user("a@x.com", "alice"), now).await.unwrap();
        let policy = LockoutPolicy::default();

        for _ in 0..4 {
            let updated = repo.record_login_failure(user.id, now, policy).await.unwrap();
            assert!(updated.locked_until.is_none());
        }
        let locked = repo.record_login_failure(user.id, now, policy).await.unwrap();
        assert_eq!(locked.login_attempts, 5);
        assert_eq!(locked.locked_until, Some(now + Duration::minutes(30)));

        let reset = repo.record_login_success(user.id, now).await.unwrap();
        assert_eq!(reset.login_attempts, 0);
        assert!(reset.locked_until.is_none());
        assert_eq!(reset.last_login_at, Some(now));
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let repo = InMemoryUserRepository::new();
        let result = repo.set_status(Uuid::new_v4(), UserStatus::Active, Utc::now()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rotate_swaps_active_session() {
        let repo = InMemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::days(7);
        let old = repo.create(new_session(user_id, "old", expires)).await.unwrap();

        let new = repo
            .rotate(old.id, new_session(user_id, "new", expires))
            .await
            .unwrap()
            .unwrap();

        let old_after = repo.find_by_token_hash("old").await.unwrap().unwrap();
        assert!(!old_after.is_active);
        assert!(old_after.was_rotated());
        assert!(new.is_active);
        assert_eq!(repo.count_active_by_user(user_id, Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rotate_retired_session_writes_nothing() {
        let repo = InMemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::days(7);
        let old = repo.create(new_session(user_id, "old", expires)).await.unwrap();
        repo.rotate(old.id, new_session(user_id, "first", expires))
            .await
            .unwrap()
            .unwrap();

        let second = repo
            .rotate(old.id, new_session(user_id, "second", expires))
            .await
            .unwrap();

        assert!(second.is_none());
        assert!(repo.find_by_token_hash("second").await.unwrap().is_none());
        assert_eq!(repo.count_active_by_user(user_id, Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logout_is_not_recorded_as_rotation() {
        let repo = InMemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let old = repo
            .create(new_session(user_id, "old", Utc::now() + Duration::days(7)))
            .await
            .unwrap();

        repo.deactivate(old.id).await.unwrap();

        let after = repo.find_by_token_hash("old").await.unwrap().unwrap();
        assert!(!after.is_active);
        assert!(!after.was_rotated());
    }

    #[tokio::test]
    async fn test_rotate_failure_keeps_old_session() {
        let repo = InMemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::days(7);
        let old = repo.create(new_session(user_id, "old", expires)).await.unwrap();
        repo.create(new_session(user_id, "taken", expires)).await.unwrap();

        let result = repo.rotate(old.id, new_session(user_id, "taken", expires)).await;
        assert!(result.is_err());
        let old_after = repo.find_by_token_hash("old").await.unwrap().unwrap();
        assert!(old_after.is_active);
        assert!(!old_after.was_rotated());
    }

    #[tokio::test]
    async fn test_delete_expired_removes_only_expired_rows() {
        let repo = InMemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        repo.create(new_session(user_id, "expired", now - Duration::minutes(1)))
            .await
            .unwrap();
        repo.create(new_session(user_id, "live", now + Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired(now).await.unwrap(), 1);
        assert_eq!(repo.len(), 1);
        assert!(repo.find_by_token_hash("live").await.unwrap().is_some());
    }
}
