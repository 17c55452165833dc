//! Postgres stores built on runtime-checked sqlx queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{LockoutPolicy, SessionRepository, UserRepository};
use crate::models::{NewSession, NewUser, Session, UserRecord, UserStatus};
use crate::utils::error::{AppError, AppResult};

const USER_COLUMNS: &str = r#"
    id, email, username, password_hash, first_name, last_name, middle_name, role,
    status, email_verified, email_verification_token, email_verification_expires,
    password_reset_token, password_reset_expires, last_login_at, login_attempts,
    locked_until, created_at, updated_at
"#;

const SESSION_COLUMNS: &str = r#"
    id, user_id, token_hash, token_family, ip_address, user_agent, is_active,
    rotated_at, expires_at, last_activity, created_at
"#;

/// Translate unique-constraint violations into field-scoped conflicts
fn map_unique_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("users_email_key") => {
                return AppError::conflict("Email already exists", "email")
            }
            Some("users_username_key") => {
                return AppError::conflict("Username already exists", "username")
            }
            Some("sessions_token_hash_key") => {
                return AppError::conflict("Session token already exists", "token_hash")
            }
            _ => {}
        }
    }
    AppError::Database(err)
}

fn user_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("User {}", id))
}

/// User store over a Postgres pool
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> AppResult<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, condition);
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            INSERT INTO users (email, username, password_hash, first_name, last_name,
                               middle_name, role, status, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.middle_name)
            .bind(&user.role)
            .bind(user.status)
            .bind(user.email_verified)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("username = $1", username).await
    }

    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("email = $1 OR username = $1 LIMIT 1", identifier)
            .await
    }

    async fn find_by_password_reset_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("password_reset_token = $1", token_hash)
            .await
    }

    async fn find_by_email_verification_token(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("email_verification_token = $1", token_hash)
            .await
    }

    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET password_reset_token = $2, password_reset_expires = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn set_email_verification_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET email_verification_token = $2, email_verification_expires = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_reset_token = NULL,
                password_reset_expires = NULL,
                updated_at = $3
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(password_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn mark_email_verified(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET email_verified = TRUE,
                email_verification_token = NULL,
                email_verification_expires = NULL,
                status = 'active',
                updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET last_login_at = $2, login_attempts = 0, locked_until = NULL, updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> AppResult<UserRecord> {
        // Increment and lock in one statement so concurrent failures cannot race past the threshold
        let sql = format!(
            r#"
            UPDATE users
            SET login_attempts = login_attempts + 1,
                locked_until = CASE
                    WHEN login_attempts + 1 >= $3 THEN $4
                    ELSE locked_until
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(now)
            .bind(policy.max_attempts)
            .bind(now + policy.lock_duration)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn clear_lockout(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET login_attempts = 0, locked_until = NULL, updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let sql = format!(
            "UPDATE users SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(status)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Session store over a Postgres pool
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn insert_sql() -> String {
        format!(
            r#"
            INSERT INTO sessions (user_id, token_hash, token_family, ip_address, user_agent,
                                  is_active, expires_at, last_activity, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $7)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        )
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: NewSession) -> AppResult<Session> {
        sqlx::query_as::<_, Session>(&Self::insert_sql())
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(session.token_family)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(session.expires_at)
            .bind(session.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE token_hash = $1",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE sessions SET last_activity = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_all_for_user(
        &self,
        user_id: Uuid,
        except_token_hash: Option<&str>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE
            WHERE user_id = $1
              AND is_active = TRUE
              AND ($2::TEXT IS NULL OR token_hash <> $2)
            "#,
        )
        .bind(user_id)
        .bind(except_token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_family(&self, token_family: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = FALSE WHERE token_family = $1 AND is_active = TRUE",
        )
        .bind(token_family)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn rotate(&self, old_id: Uuid, replacement: NewSession) -> AppResult<Option<Session>> {
        let mut tx = self.pool.begin().await?;

        // Only one concurrent refresh can retire the row
        let retired = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE, rotated_at = $2
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(old_id)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await?;

        if retired.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let session = sqlx::query_as::<_, Session>(&Self::insert_sql())
            .bind(replacement.user_id)
            .bind(&replacement.token_hash)
            .bind(replacement.token_family)
            .bind(&replacement.ip_address)
            .bind(&replacement.user_agent)
            .bind(replacement.expires_at)
            .bind(replacement.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_unique_violation)?;

        tx.commit().await?;
        Ok(Some(session))
    }

    async fn find_active_by_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM sessions
            WHERE user_id = $1 AND is_active = TRUE AND expires_at > $2
            ORDER BY last_activity DESC
            "#,
            SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, Session>(&sql)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    async fn count_active_by_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sessions
            WHERE user_id = $1 AND is_active = TRUE AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
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

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn test_unique_constraints_map_to_conflicts(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let now = Utc::now();
        repo.create(new_user("a@x.com", "alice"), now).await.unwrap();

        match repo.create(new_user("a@x.com", "bob"), now).await {
            Err(AppError::Conflict { field, .. }) => assert_eq!(field, "email"),
            other => panic!("expected conflict, got {:?}", other),
        }
        match repo.create(new_user("b@x.com", "alice"), now).await {
            Err(AppError::Conflict { field, .. }) => assert_eq!(field, "username"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn test_lockout_update_is_atomic(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let now = Utc::now();
        let user = repo.create(new_user("a@x.com", "alice"), now).await.unwrap();
        let policy = LockoutPolicy::default();

        let mut last = user;
        for _ in 0..5 {
            last = repo.record_login_failure(last.id, now, policy).await.unwrap();
        }
        assert_eq!(last.login_attempts, 5);
        assert!(last.is_locked(now + Duration::minutes(29)));
        assert!(!last.is_locked(now + Duration::minutes(31)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn test_rotate_and_family_revocation(pool: PgPool) {
        let users = PgUserRepository::new(pool.clone());
        let sessions = PgSessionRepository::new(pool);
        let now = Utc::now();
        let user = users.create(new_user("a@x.com", "alice"), now).await.unwrap();
        let family = Uuid::new_v4();

        let first = sessions
            .create(NewSession {
                user_id: user.id,
                token_hash: "first".to_string(),
                token_family: family,
                ip_address: Some("127.0.0.1".to_string()),
                user_agent: None,
                expires_at: now + Duration::days(7),
                created_at: now,
            })
            .await
            .unwrap();

        let second = sessions
            .rotate(
                first.id,
                NewSession {
                    user_id: user.id,
                    token_hash: "second".to_string(),
                    token_family: family,
                    ip_address: None,
                    user_agent: None,
                    expires_at: now + Duration::days(7),
                    created_at: now,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(second.is_active);
        assert_eq!(sessions.count_active_by_user(user.id, now).await.unwrap(), 1);

        let retired = sessions.find_by_token_hash("first").await.unwrap().unwrap();
        assert!(retired.was_rotated());

        // The retired row cannot be rotated a second time
        let again = sessions
            .rotate(
                first.id,
                NewSession {
                    user_id: user.id,
                    token_hash: "third".to_string(),
                    token_family: family,
                    ip_address: None,
                    user_agent: None,
                    expires_at: now + Duration::days(7),
                    created_at: now,
                },
            )
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(sessions.find_by_token_hash("third").await.unwrap().is_none());
        assert_eq!(sessions.deactivate_family(family).await.unwrap(), 1);
        assert_eq!(sessions.count_active_by_user(user.id, now).await.unwrap(), 0);
    }
}
