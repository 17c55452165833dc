//! Auth Validator
//!
//! Registration and login gates. Registration problems are collected per
//! field and reported together; login failures never reveal whether the
//! account exists or which factor was wrong.

use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use crate::models::{ClientInfo, LoginRequest, RegisterRequest, UserRecord, UserStatus};
use crate::service::audit::{SecurityEvent, SecurityEventKind, SecurityEventSink};
use crate::service::messages;
use crate::service::user::UserService;
use crate::utils::error::{check_validation, AppError, AppResult};
use crate::utils::security::compare_password;
use crate::utils::validation::{field_error, messages as field_messages, password_strength_errors};

pub struct AuthValidator {
    users: Arc<UserService>,
    events: Arc<dyn SecurityEventSink>,
}

impl AuthValidator {
    pub fn new(users: Arc<UserService>, events: Arc<dyn SecurityEventSink>) -> Self {
        Self { users, events }
    }

    /// Check every registration rule, reporting all violations at once
    pub async fn validate_registration(&self, request: &RegisterRequest) -> AppResult<()> {
        let mut errors = request.validate().err().unwrap_or_else(ValidationErrors::new);

        // Uniqueness is only looked up for well-formed values
        if !errors.errors().contains_key("email")
            && self.users.find_by_email(&request.email).await?.is_some()
        {
            errors.add("email", field_error("taken", field_messages::EMAIL_TAKEN));
        }
        if !errors.errors().contains_key("username")
            && self.users.find_by_username(&request.username).await?.is_some()
        {
            errors.add("username", field_error("taken", field_messages::USERNAME_TAKEN));
        }

        for error in password_strength_errors(&request.password) {
            errors.add("password", error);
        }

        check_validation(errors)
    }

    /// Resolve the account for a login attempt, enforcing lockout and status gates
    pub async fn validate_login(
        &self,
        request: &LoginRequest,
        client: &ClientInfo,
    ) -> AppResult<UserRecord> {
        let user = self
            .users
            .find_by_email_or_username(&request.email_or_username)
            .await?
            .ok_or_else(|| AppError::unauthorized(messages::INVALID_CREDENTIALS))?;

        let now = self.users.now();
        if user.is_locked(now) {
            return Err(AppError::unauthorized(messages::ACCOUNT_LOCKED));
        }

        if !compare_password(&request.password, &user.password_hash)? {
            let updated = self.users.record_login_failure(user.id).await?;
            let event = if updated.is_locked(now) {
                log::warn!(
                    "Account {} locked after {} failed login attempts",
                    user.id,
                    updated.login_attempts
                );
                SecurityEventKind::AccountLocked
            } else {
                SecurityEventKind::LoginFailure
            };
            self.events.record(
                SecurityEvent::new(event, now)
                    .user(user.id)
                    .client(client.ip_address.clone(), client.user_agent.clone())
                    .detail(format!("attempts={}", updated.login_attempts)),
            );
            return Err(AppError::unauthorized(messages::INVALID_CREDENTIALS));
        }

        match user.status {
            UserStatus::Inactive => Err(AppError::unauthorized(messages::ACCOUNT_INACTIVE)),
            UserStatus::Suspended => Err(AppError::unauthorized(messages::ACCOUNT_SUSPENDED)),
            UserStatus::Pending if !user.email_verified => {
                Err(AppError::unauthorized(messages::EMAIL_NOT_VERIFIED))
            }
            _ => Ok(user),
        }
    }

    /// Strength rules for a new password, all violations under `password`
    pub fn validate_password_strength(&self, password: &str) -> AppResult<()> {
        let mut errors = ValidationErrors::new();
        for error in password_strength_errors(password) {
            errors.add("password", error);
        }
        check_validation(errors)
    }

    pub fn validate_password_match(&self, password: &str, confirm: &str) -> AppResult<()> {
        if password != confirm {
            return Err(AppError::validation(
                "confirm_password",
                field_messages::PASSWORDS_DO_NOT_MATCH,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, DEFAULT_ROLE};
    use crate::repository::InMemoryUserRepository;
    use crate::service::audit::RecordingEventSink;
    use crate::utils::clock::{Clock, MockClock};
    use crate::utils::error::validation_details;
    use crate::utils::security::hash_password;
    use chrono::{Duration, Utc};

    const PASSWORD: &str = "Secur3!Pass";

    struct Fixture {
        clock: Arc<MockClock>,
        users: Arc<UserService>,
        events: Arc<RecordingEventSink>,
        validator: AuthValidator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new(Utc::now()));
        let users = Arc::new(UserService::new(
            Arc::new(InMemoryUserRepository::new()),
            clock.clone(),
        ));
        let events = Arc::new(RecordingEventSink::new());
        let validator = AuthValidator::new(users.clone(), events.clone());
        Fixture {
            clock,
            users,
            events,
            validator,
        }
    }

    async fn create_user(users: &UserService, status: UserStatus, verified: bool) -> UserRecord {
        users
            .create(NewUser {
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                password_hash: hash_password(PASSWORD, 4).unwrap(),
                first_name: "Alice".to_string(),
                last_name: "Smith".to_string(),
                middle_name: None,
                role: DEFAULT_ROLE.to_string(),
                status,
                email_verified: verified,
            })
            .await
            .unwrap()
    }

    fn register_request(email: &str, username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            middle_name: None,
        }
    }

    fn login(identifier: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email_or_username: identifier.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_registration_aggregates_all_violations() {
        let f = fixture();
        let mut request = register_request("not-an-email", "a!", "weak");
        request.first_name = "  ".to_string();
        request.middle_name = Some("x".repeat(101));

        match f.validator.validate_registration(&request).await {
            Err(AppError::Validation(errors)) => {
                let details = validation_details(&errors);
                assert_eq!(
                    details.keys().collect::<Vec<_>>(),
                    vec!["email", "first_name", "middle_name", "password", "username"]
                );
                assert_eq!(details.get("password").map(Vec::len), Some(4));
                assert_eq!(details["email"], vec![field_messages::INVALID_EMAIL]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_registration_uniqueness_is_case_insensitive() {
        let f = fixture();
        create_user(&f.users, UserStatus::Active, true).await;

        let request = register_request("A@X.com", "ALICE", PASSWORD);
        match f.validator.validate_registration(&request).await {
            Err(AppError::Validation(errors)) => {
                let details = validation_details(&errors);
                assert_eq!(details["email"], vec![field_messages::EMAIL_TAKEN]);
                assert_eq!(details["username"], vec![field_messages::USERNAME_TAKEN]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_valid_registration_passes() {
        let f = fixture();
        let request = register_request("a@x.com", "alice", PASSWORD);
        assert!(f.validator.validate_registration(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_user_gets_generic_message() {
        let f = fixture();
        match f.validator.validate_login(&login("nobody", PASSWORD), &ClientInfo::default()).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::INVALID_CREDENTIALS),
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fifth_failure_locks_account() {
        let f = fixture();
        let user = create_user(&f.users, UserStatus::Active, true).await;
        let client = ClientInfo::default();

        for _ in 0..5 {
            match f.validator.validate_login(&login("a@x.com", "Wrong!Pass1"), &client).await {
                Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::INVALID_CREDENTIALS),
                other => panic!("expected unauthorized, got {:?}", other),
            }
        }

        let stored = f.users.get_by_id(user.id).await.unwrap();
        assert_eq!(stored.login_attempts, 5);
        assert_eq!(stored.locked_until, Some(f.clock.now() + Duration::minutes(30)));
        assert_eq!(f.events.kinds().last(), Some(&SecurityEventKind::AccountLocked));

        // Correct password during lockout still fails, distinctly
        match f.validator.validate_login(&login("a@x.com", PASSWORD), &client).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::ACCOUNT_LOCKED),
            other => panic!("expected lockout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_four_failures_do_not_lock() {
        let f = fixture();
        let user = create_user(&f.users, UserStatus::Active, true).await;

        for _ in 0..4 {
            let _ = f
                .validator
                .validate_login(&login("alice", "Wrong!Pass1"), &ClientInfo::default())
                .await;
        }

        let stored = f.users.get_by_id(user.id).await.unwrap();
        assert!(!stored.is_locked(f.clock.now()));
        assert!(f
            .validator
            .validate_login(&login("alice", PASSWORD), &ClientInfo::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_status_gates() {
        let cases = [
            (UserStatus::Inactive, true, messages::ACCOUNT_INACTIVE),
            (UserStatus::Suspended, true, messages::ACCOUNT_SUSPENDED),
            (UserStatus::Pending, false, messages::EMAIL_NOT_VERIFIED),
        ];

        for (status, verified, expected) in cases {
            let f = fixture();
            create_user(&f.users, status, verified).await;
            match f
                .validator
                .validate_login(&login("a@x.com", PASSWORD), &ClientInfo::default())
                .await
            {
                Err(AppError::Unauthorized(msg)) => assert_eq!(msg, expected),
                other => panic!("expected {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_password_rules() {
        let f = fixture();
        assert!(f.validator.validate_password_strength(PASSWORD).is_ok());
        match f.validator.validate_password_strength("abc") {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.field_errors().get("password").map(|e| e.len()), Some(4))
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        assert!(f.validator.validate_password_match(PASSWORD, PASSWORD).is_ok());
        match f.validator.validate_password_match(PASSWORD, "other") {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("confirm_password"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
