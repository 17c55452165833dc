//! User Model
//!
//! Core user data structures and type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default role assigned to newly registered accounts
pub const DEFAULT_ROLE: &str = "EMPLOYEE";

/// Roles allowed to look up and change the status of other accounts
pub const USER_ADMIN_ROLES: &[&str] = &["SUPER_ADMIN", "HR_ADMIN"];

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }
}

/// Full user row including the password hash and stored token digests
///
/// Never returned from the API. Serializable so the user cache can hold it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub role: String,
    pub status: UserStatus,
    pub email_verified: bool,
    /// SHA-256 of the outstanding email verification token
    pub email_verification_token: Option<String>,
    pub email_verification_expires: Option<DateTime<Utc>>,
    /// SHA-256 of the outstanding password reset token
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Whether a lockout is still in force at `now`
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn full_name(&self) -> String {
        let mut parts = vec![self.first_name.as_str()];
        if let Some(middle) = self.middle_name.as_deref() {
            parts.push(middle);
        }
        parts.push(self.last_name.as_str());
        parts.join(" ")
    }
}

/// Fields needed to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub role: String,
    pub status: UserStatus,
    pub email_verified: bool,
}

/// User representation for external API responses
///
/// Carries no password hash and none of the stored token fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub role: String,
    pub status: UserStatus,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id,
            email: record.email,
            username: record.username,
            first_name: record.first_name,
            last_name: record.last_name,
            middle_name: record.middle_name,
            role: record.role,
            status: record.status,
            email_verified: record.email_verified,
            last_login_at: record.last_login_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> UserRecord {
    let now = Utc::now();
    UserRecord {
        id: Uuid::new_v4(),
        email: "a@x.com".to_string(),
        username: "alice".to_string(),
        password_hash: "hashed_password".to_string(),
        first_name: "Alice".to_string(),
        last_name: "Smith".to_string(),
        middle_name: None,
        role: DEFAULT_ROLE.to_string(),
        status: UserStatus::Active,
        email_verified: true,
        email_verification_token: Some("verification_digest".to_string()),
        email_verification_expires: None,
        password_reset_token: Some("reset_digest".to_string()),
        password_reset_expires: None,
        last_login_at: None,
        login_attempts: 0,
        locked_until: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_sanitized_user_has_no_secrets() {
        let record = sample_record();
        let user: User = record.into();
        let json = serde_json::to_string(&user).unwrap();

        assert_eq!(user.username, "alice");
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("hashed_password"));
        assert!(!json.contains("reset_digest"));
        assert!(!json.contains("verification_digest"));
    }

    #[test]
    fn test_lock_state_depends_on_now() {
        let now = Utc::now();
        let mut record = sample_record();
        assert!(!record.is_locked(now));

        record.locked_until = Some(now + Duration::minutes(30));
        assert!(record.is_locked(now));
        assert!(!record.is_locked(now + Duration::minutes(30)));
    }

    #[test]
    fn test_full_name_includes_middle_name() {
        let mut record = sample_record();
        assert_eq!(record.full_name(), "Alice Smith");
        record.middle_name = Some("Jane".to_string());
        assert_eq!(record.full_name(), "Alice Jane Smith");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&UserStatus::Suspended).unwrap(),
            "\"suspended\""
        );
        assert_eq!(UserStatus::Pending.as_str(), "pending");
    }
}
