//! Authentication Service
//!
//! Public authentication operations built from the user, token and session
//! services: register, login, logout, refresh, password change and reset,
//! and email verification.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuthResponse, ChangePasswordRequest, ClientInfo, LoginRequest, NewUser, RegisterRequest,
    ResetPasswordRequest, SessionInfo, TokenPair, User, UserRecord, UserStatus, DEFAULT_ROLE,
};
use crate::service::audit::{SecurityEvent, SecurityEventKind, SecurityEventSink};
use crate::service::messages;
use crate::service::session::SessionService;
use crate::service::token::TokenService;
use crate::service::user::UserService;
use crate::service::validator::AuthValidator;
use crate::utils::error::{AppError, AppResult};
use crate::utils::security::{compare_password, hash_password, DEFAULT_BCRYPT_COST};

/// Result of a registration
///
/// The verification token is handed to the caller for delivery and is never
/// echoed over HTTP.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub response: AuthResponse,
    pub email_verification_token: String,
}

pub struct AuthenticationService {
    users: Arc<UserService>,
    tokens: Arc<TokenService>,
    sessions: Arc<SessionService>,
    validator: AuthValidator,
    events: Arc<dyn SecurityEventSink>,
    bcrypt_cost: u32,
}

impl AuthenticationService {
    pub fn new(
        users: Arc<UserService>,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionService>,
        events: Arc<dyn SecurityEventSink>,
    ) -> Self {
        Self {
            validator: AuthValidator::new(users.clone(), events.clone()),
            users,
            tokens,
            sessions,
            events,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    fn emit(&self, kind: SecurityEventKind, user_id: Uuid, client: Option<&ClientInfo>) {
        let mut event = SecurityEvent::new(kind, self.users.now()).user(user_id);
        if let Some(client) = client {
            event = event.client(client.ip_address.clone(), client.user_agent.clone());
        }
        self.events.record(event);
    }

    /// Create a pending account and open its first session
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> AppResult<RegistrationOutcome> {
        self.validator.validate_registration(&request).await?;

        let password_hash = hash_password(&request.password, self.bcrypt_cost)?;
        let user = self
            .users
            .create(NewUser {
                email: request.email,
                username: request.username,
                password_hash,
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                middle_name: request
                    .middle_name
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty()),
                role: DEFAULT_ROLE.to_string(),
                status: UserStatus::Pending,
                email_verified: false,
            })
            .await?;

        let email_verification_token = self.tokens.generate_email_verification_token(user.id).await?;
        let tokens = self.tokens.generate_token_pair(&user)?;
        self.sessions
            .create_session(user.id, &tokens.refresh_token, client)
            .await?;

        log::info!("Registered user {} ({})", user.id, user.username);
        self.emit(SecurityEventKind::Registration, user.id, Some(client));

        Ok(RegistrationOutcome {
            response: AuthResponse {
                user: user.into(),
                tokens,
            },
            email_verification_token,
        })
    }

    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> AppResult<AuthResponse> {
        let user = self.validator.validate_login(&request, client).await?;
        let user = self.users.record_login_success(user.id).await?;

        let tokens = self.tokens.generate_token_pair(&user)?;
        self.sessions
            .create_session(user.id, &tokens.refresh_token, client)
            .await?;

        self.emit(SecurityEventKind::LoginSuccess, user.id, Some(client));
        Ok(AuthResponse {
            user: user.into(),
            tokens,
        })
    }

    /// End the session of `refresh_token` if it belongs to the caller
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        if self
            .sessions
            .invalidate_user_session(user_id, refresh_token)
            .await?
        {
            self.emit(SecurityEventKind::Logout, user_id, None);
        }
        Ok(())
    }

    pub async fn logout_all_devices(&self, user_id: Uuid) -> AppResult<u64> {
        let revoked = self.sessions.invalidate_all_user_sessions(user_id).await?;
        log::info!("Revoked {} session(s) for user {}", revoked, user_id);
        self.emit(SecurityEventKind::LogoutAll, user_id, None);
        Ok(revoked)
    }

    /// Exchange a refresh token for a new pair, retiring the old session
    pub async fn refresh_tokens(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;
        let (user_id, family) = match (claims.user_id(), claims.family()) {
            (Some(user_id), Some(family)) => (user_id, family),
            _ => return Err(AppError::unauthorized(messages::TOKEN_INVALID)),
        };

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or_else(|| AppError::unauthorized(messages::UNAUTHORIZED))?;

        let tokens = self.tokens.generate_rotated_token_pair(&user, family)?;
        self.sessions
            .rotate_refresh_token(refresh_token, &tokens.refresh_token)
            .await?;

        self.emit(SecurityEventKind::TokenRefresh, user.id, None);
        Ok(tokens)
    }

    /// Change the caller's password and end every other session
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: &ChangePasswordRequest,
    ) -> AppResult<()> {
        let user = self.users.get_by_id(user_id).await?;
        if !compare_password(&request.current_password, &user.password_hash)? {
            return Err(AppError::business(messages::INVALID_CREDENTIALS));
        }

        self.validator.validate_password_strength(&request.new_password)?;
        self.validator
            .validate_password_match(&request.new_password, &request.confirm_password)?;

        let password_hash = hash_password(&request.new_password, self.bcrypt_cost)?;
        self.users.update_password(user.id, &password_hash).await?;

        let revoked = match request.refresh_token.as_deref() {
            Some(keep) => {
                self.sessions
                    .invalidate_other_user_sessions(user.id, keep)
                    .await?
            }
            None => self.sessions.invalidate_all_user_sessions(user.id).await?,
        };
        log::info!(
            "Password changed for user {}; revoked {} session(s)",
            user.id,
            revoked
        );
        self.emit(SecurityEventKind::PasswordChanged, user.id, None);
        Ok(())
    }

    /// Issue a reset token; unknown emails succeed silently with `None`
    pub async fn request_password_reset(&self, email: &str) -> AppResult<Option<String>> {
        let Some(user) = self.users.find_by_email(email).await? else {
            log::debug!("Password reset requested for unknown email");
            return Ok(None);
        };

        let token = self.tokens.generate_password_reset_token(user.id).await?;
        self.emit(SecurityEventKind::PasswordResetRequested, user.id, None);
        Ok(Some(token))
    }

    /// Set a new password from a reset token and end every session
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> AppResult<()> {
        let user = self.tokens.verify_password_reset_token(&request.token).await?;

        self.validator.validate_password_strength(&request.password)?;
        self.validator
            .validate_password_match(&request.password, &request.confirm_password)?;

        let password_hash = hash_password(&request.password, self.bcrypt_cost)?;
        self.users.update_password(user.id, &password_hash).await?;
        self.sessions.invalidate_all_user_sessions(user.id).await?;

        self.emit(SecurityEventKind::PasswordReset, user.id, None);
        Ok(())
    }

    /// Mark the email verified and activate the account
    pub async fn verify_email(&self, token: &str) -> AppResult<User> {
        let user = self.tokens.verify_email_verification_token(token).await?;
        let user = self.users.mark_email_verified(user.id).await?;

        self.emit(SecurityEventKind::EmailVerified, user.id, None);
        Ok(user.into())
    }

    pub async fn current_user(&self, user_id: Uuid) -> AppResult<User> {
        self.get_user(user_id).await
    }

    /// Any account by id, for administrators
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        Ok(self.users.get_by_id(user_id).await?.into())
    }

    /// Set an account's status, returning the account and how many sessions ended
    ///
    /// Every status other than `Active` also revokes all of the account's sessions.
    pub async fn change_account_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> AppResult<(UserRecord, u64)> {
        let user = self.users.set_status(user_id, status).await?;
        let revoked = if status == UserStatus::Active {
            0
        } else {
            self.sessions.invalidate_all_user_sessions(user.id).await?
        };

        if revoked > 0 {
            log::info!("Revoked {} session(s) for user {}", revoked, user.id);
        }
        self.emit(SecurityEventKind::AccountStatusChanged, user.id, None);
        Ok((user, revoked))
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> AppResult<Vec<SessionInfo>> {
        Ok(self
            .sessions
            .get_active_sessions(user_id)
            .await?
            .into_iter()
            .map(SessionInfo::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{in_memory_services, TestServices};
    use crate::utils::security::hash_token;
    use chrono::Duration;

    const PASSWORD: &str = "Secur3!Pass";

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: PASSWORD.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            middle_name: None,
        }
    }

    fn login_request(identifier: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email_or_username: identifier.to_string(),
            password: password.to_string(),
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip_address: Some("192.168.1.10".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    /// Registered and verified user, returning the login response
    async fn active_user(s: &TestServices) -> AuthResponse {
        let outcome = s.auth.register(register_request(), &client()).await.unwrap();
        s.auth
            .verify_email(&outcome.email_verification_token)
            .await
            .unwrap();
        s.auth
            .login(login_request("a@x.com", PASSWORD), &client())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_login_verify_flow() {
        let s = in_memory_services();

        let outcome = s.auth.register(register_request(), &client()).await.unwrap();
        let user = &outcome.response.user;
        assert_eq!(user.status, UserStatus::Pending);
        assert!(!user.email_verified);
        assert_eq!(user.role, DEFAULT_ROLE);
        assert!(!outcome.response.tokens.access_token.is_empty());
        assert_eq!(s.sessions.count_active_sessions(user.id).await.unwrap(), 1);

        match s.auth.login(login_request("a@x.com", PASSWORD), &client()).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::EMAIL_NOT_VERIFIED),
            other => panic!("expected unverified failure, got {:?}", other),
        }

        let verified = s
            .auth
            .verify_email(&outcome.email_verification_token)
            .await
            .unwrap();
        assert_eq!(verified.status, UserStatus::Active);
        assert!(verified.email_verified);

        let login = s
            .auth
            .login(login_request("a@x.com", PASSWORD), &client())
            .await
            .unwrap();
        assert!(login.user.last_login_at.is_some());
        assert_ne!(login.tokens.refresh_token, outcome.response.tokens.refresh_token);
        assert_eq!(s.sessions.count_active_sessions(user.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_password_is_hashed_and_identity_case_insensitive() {
        let s = in_memory_services();
        let mut request = register_request();
        request.email = "John@Example.com".to_string();
        let outcome = s.auth.register(request, &client()).await.unwrap();

        let stored = s
            .users
            .find_by_email("john@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, outcome.response.user.id);
        assert_ne!(stored.password_hash, PASSWORD);
        assert!(compare_password(PASSWORD, &stored.password_hash).unwrap());
        assert_eq!(
            stored.email_verification_token,
            Some(hash_token(&outcome.email_verification_token))
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let s = in_memory_services();
        s.auth.register(register_request(), &client()).await.unwrap();
        assert!(matches!(
            s.auth.register(register_request(), &client()).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_lockout_expires_and_success_resets_counter() {
        let s = in_memory_services();
        let user_id = active_user(&s).await.user.id;

        for _ in 0..5 {
            assert!(s
                .auth
                .login(login_request("a@x.com", "Wrong!Pass9"), &client())
                .await
                .is_err());
        }
        match s.auth.login(login_request("a@x.com", PASSWORD), &client()).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::ACCOUNT_LOCKED),
            other => panic!("expected lockout, got {:?}", other),
        }

        s.clock.advance(Duration::minutes(31));
        s.auth
            .login(login_request("a@x.com", PASSWORD), &client())
            .await
            .unwrap();

        let stored = s.users.get_by_id(user_id).await.unwrap();
        assert_eq!(stored.login_attempts, 0);
        assert!(stored.locked_until.is_none());
        assert!(s.events.kinds().contains(&SecurityEventKind::AccountLocked));
    }

    #[tokio::test]
    async fn test_refresh_is_single_use() {
        let s = in_memory_services();
        let login = active_user(&s).await;
        let refresh_token = login.tokens.refresh_token.clone();

        let rotated = s.auth.refresh_tokens(&refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, refresh_token);

        assert!(matches!(
            s.auth.refresh_tokens(&refresh_token).await,
            Err(AppError::Unauthorized(_))
        ));
        // The replay revoked the whole family, including the rotated session
        assert!(s.auth.refresh_tokens(&rotated.refresh_token).await.is_err());
        assert!(s.events.kinds().contains(&SecurityEventKind::RefreshTokenReuse));
    }

    #[tokio::test]
    async fn test_refresh_requires_active_user() {
        let s = in_memory_services();
        let login = active_user(&s).await;
        s.users
            .set_status(login.user.id, UserStatus::Suspended)
            .await
            .unwrap();

        match s.auth.refresh_tokens(&login.tokens.refresh_token).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::UNAUTHORIZED),
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_logout_only_ends_callers_session() {
        let s = in_memory_services();
        let login = active_user(&s).await;

        s.auth
            .logout(Uuid::new_v4(), &login.tokens.refresh_token)
            .await
            .unwrap();
        assert!(s.sessions.validate_session(&login.tokens.refresh_token).await.is_ok());

        s.auth
            .logout(login.user.id, &login.tokens.refresh_token)
            .await
            .unwrap();
        assert!(s.sessions.validate_session(&login.tokens.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_logout_all_devices() {
        let s = in_memory_services();
        let login = active_user(&s).await;
        // registration session plus login session
        assert_eq!(s.auth.logout_all_devices(login.user.id).await.unwrap(), 2);
        assert!(s.auth.list_sessions(login.user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_password_invalidates_other_sessions() {
        let s = in_memory_services();
        let first = active_user(&s).await;
        let second = s
            .auth
            .login(login_request("alice", PASSWORD), &client())
            .await
            .unwrap();
        assert!(s.sessions.validate_session(&first.tokens.refresh_token).await.is_ok());

        s.auth
            .change_password(
                first.user.id,
                &ChangePasswordRequest {
                    current_password: PASSWORD.to_string(),
                    new_password: "N3w!Secret".to_string(),
                    confirm_password: "N3w!Secret".to_string(),
                    refresh_token: Some(second.tokens.refresh_token.clone()),
                },
            )
            .await
            .unwrap();

        assert!(s.sessions.validate_session(&first.tokens.refresh_token).await.is_err());
        assert!(s.sessions.validate_session(&second.tokens.refresh_token).await.is_ok());
        assert!(s
            .auth
            .login(login_request("alice", "N3w!Secret"), &client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_rejects_wrong_current_password() {
        let s = in_memory_services();
        let login = active_user(&s).await;

        let result = s
            .auth
            .change_password(
                login.user.id,
                &ChangePasswordRequest {
                    current_password: "Wrong!Pass9".to_string(),
                    new_password: "N3w!Secret".to_string(),
                    confirm_password: "N3w!Secret".to_string(),
                    refresh_token: None,
                },
            )
            .await;
        match result {
            Err(AppError::Business(msg)) => assert_eq!(msg, messages::INVALID_CREDENTIALS),
            other => panic!("expected business error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_request_for_unknown_email_is_silent() {
        let s = in_memory_services();
        active_user(&s).await;
        let before = s.events.events().len();

        assert!(s
            .auth
            .request_password_reset("nobody@x.com")
            .await
            .unwrap()
            .is_none());
        assert_eq!(s.events.events().len(), before);
    }

    #[tokio::test]
    async fn test_reset_password_window_and_session_revocation() {
        let s = in_memory_services();
        let login = active_user(&s).await;
        let token = s
            .auth
            .request_password_reset("A@X.COM")
            .await
            .unwrap()
            .unwrap();

        s.clock.advance(Duration::minutes(59));
        let reset = ResetPasswordRequest {
            token: token.clone(),
            password: "Fresh!Pass7".to_string(),
            confirm_password: "Fresh!Pass7".to_string(),
        };
        s.auth.reset_password(&reset).await.unwrap();

        assert_eq!(s.sessions.count_active_sessions(login.user.id).await.unwrap(), 0);
        let stored = s.users.get_by_id(login.user.id).await.unwrap();
        assert!(stored.password_reset_token.is_none());
        assert!(stored.password_reset_expires.is_none());

        // Token is single use
        assert!(matches!(
            s.auth.reset_password(&reset).await,
            Err(AppError::Business(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_token_expired_after_window() {
        let s = in_memory_services();
        active_user(&s).await;
        let token = s
            .auth
            .request_password_reset("a@x.com")
            .await
            .unwrap()
            .unwrap();

        s.clock.advance(Duration::minutes(61));
        let result = s
            .auth
            .reset_password(&ResetPasswordRequest {
                token,
                password: "Fresh!Pass7".to_string(),
                confirm_password: "Fresh!Pass7".to_string(),
            })
            .await;
        match result {
            Err(AppError::Business(msg)) => assert_eq!(msg, messages::TOKEN_EXPIRED),
            other => panic!("expected expired token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_current_user_and_sessions_are_sanitized() {
        let s = in_memory_services();
        let login = active_user(&s).await;

        let me = s.auth.current_user(login.user.id).await.unwrap();
        assert_eq!(me.username, "alice");

        let sessions = s.auth.list_sessions(login.user.id).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].ip_address.as_deref(), Some("192.168.1.10"));
    }

    #[tokio::test]
    async fn test_suspending_account_ends_its_sessions() {
        let s = in_memory_services();
        let login = active_user(&s).await;

        let (user, revoked) = s
            .auth
            .change_account_status(login.user.id, UserStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Suspended);
        assert_eq!(revoked, 2);
        assert!(s.events.kinds().contains(&SecurityEventKind::AccountStatusChanged));

        let result = s.auth.refresh_tokens(&login.tokens.refresh_token).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_activating_account_keeps_sessions() {
        let s = in_memory_services();
        let login = active_user(&s).await;

        let (user, revoked) = s
            .auth
            .change_account_status(login.user.id, UserStatus::Active)
            .await
            .unwrap();
        assert!(user.is_active());
        assert_eq!(revoked, 0);
        assert_eq!(s.auth.list_sessions(login.user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_change_for_unknown_account() {
        let s = in_memory_services();
        let result = s
            .auth
            .change_account_status(Uuid::new_v4(), UserStatus::Suspended)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
