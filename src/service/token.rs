//! Token Service
//!
//! Issues and verifies signed access/refresh token pairs and manages the
//! single-use password reset and email verification tokens stored (hashed)
//! on the user row.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{parse_duration, AuthConfig, JwtConfig};
use crate::models::{AccessTokenClaims, RefreshTokenClaims, TokenPair, UserContext, UserRecord};
use crate::service::messages;
use crate::service::user::UserService;
use crate::utils::clock::Clock;
use crate::utils::error::{AppError, AppResult};
use crate::utils::security::{generate_token, hash_token, DEFAULT_TOKEN_BYTES};

/// Fallback for `expires_in` when the access lifetime string cannot be parsed
pub const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

/// Seconds in a `<n><unit>` lifetime string, 3600 when unparseable
pub fn parse_expires_in(value: &str) -> i64 {
    parse_duration(value)
        .map(|d| d.num_seconds())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECONDS)
}

fn invalid_token() -> AppError {
    AppError::unauthorized(messages::TOKEN_INVALID)
}

/// JWT and single-use token management
pub struct TokenService {
    jwt: JwtConfig,
    access_ttl: Duration,
    refresh_ttl: Duration,
    password_reset_ttl: Duration,
    email_verification_ttl: Duration,
    users: Arc<UserService>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        jwt: JwtConfig,
        auth: &AuthConfig,
        users: Arc<UserService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let access_ttl = Duration::seconds(parse_expires_in(&jwt.access_expires_in));
        let refresh_ttl = parse_duration(&jwt.refresh_expires_in).unwrap_or_else(|| {
            log::warn!(
                "Unparseable refresh token lifetime {:?}, using 7d",
                jwt.refresh_expires_in
            );
            Duration::days(7)
        });

        Self {
            jwt,
            access_ttl,
            refresh_ttl,
            password_reset_ttl: auth.password_reset_lifetime(),
            email_verification_ttl: auth.email_verification_lifetime(),
            users,
            clock,
        }
    }

    /// Access token lifetime in seconds, as reported in `TokenPair::expires_in`
    pub fn expires_in(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Issue a pair whose refresh token starts a new token family
    pub fn generate_token_pair(&self, user: &UserRecord) -> AppResult<TokenPair> {
        self.generate_rotated_token_pair(user, Uuid::new_v4())
    }

    /// Issue a pair whose refresh token continues `token_family`
    pub fn generate_rotated_token_pair(
        &self,
        user: &UserRecord,
        token_family: Uuid,
    ) -> AppResult<TokenPair> {
        let now = self.clock.now();

        let access_claims = AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            permissions: None,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.jwt.issuer.clone(),
            aud: self.jwt.audience.clone(),
        };
        let refresh_claims = RefreshTokenClaims {
            sub: user.id.to_string(),
            token_family: token_family.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.jwt.issuer.clone(),
            aud: self.jwt.audience.clone(),
        };

        let access_token = self.sign(&access_claims, &self.jwt.access_secret)?;
        let refresh_token = self.sign(&refresh_claims, &self.jwt.refresh_secret)?;

        Ok(TokenPair::new(access_token, refresh_token, self.expires_in()))
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<AccessTokenClaims> {
        let claims: AccessTokenClaims = self.decode(token, &self.jwt.access_secret)?;
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AppResult<RefreshTokenClaims> {
        let claims: RefreshTokenClaims = self.decode(token, &self.jwt.refresh_secret)?;
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    /// Verify an access token and extract the caller identity
    pub fn validate_access_token(&self, token: &str) -> AppResult<UserContext> {
        let claims = self.verify_access_token(token)?;
        UserContext::from_access_claims(&claims).map_err(|e| {
            log::debug!("Access token subject is not a UUID: {}", e);
            invalid_token()
        })
    }

    /// Store a fresh reset token digest on the user and return the cleartext
    pub async fn generate_password_reset_token(&self, user_id: Uuid) -> AppResult<String> {
        let token = generate_token(DEFAULT_TOKEN_BYTES);
        let expires_at = self.clock.now() + self.password_reset_ttl;
        self.users
            .set_password_reset_token(user_id, &hash_token(&token), expires_at)
            .await?;
        Ok(token)
    }

    /// Resolve the user owning a live reset token
    pub async fn verify_password_reset_token(&self, token: &str) -> AppResult<UserRecord> {
        let user = self
            .users
            .find_by_password_reset_token(&hash_token(token))
            .await?
            .ok_or_else(|| AppError::business(messages::TOKEN_INVALID))?;

        self.check_single_use_expiry(user.password_reset_expires)?;
        Ok(user)
    }

    /// Store a fresh verification token digest on the user and return the cleartext
    pub async fn generate_email_verification_token(&self, user_id: Uuid) -> AppResult<String> {
        let token = generate_token(DEFAULT_TOKEN_BYTES);
        let expires_at = self.clock.now() + self.email_verification_ttl;
        self.users
            .set_email_verification_token(user_id, &hash_token(&token), Some(expires_at))
            .await?;
        Ok(token)
    }

    /// Resolve the user owning a live verification token
    pub async fn verify_email_verification_token(&self, token: &str) -> AppResult<UserRecord> {
        let user = self
            .users
            .find_by_email_verification_token(&hash_token(token))
            .await?
            .ok_or_else(|| AppError::business(messages::TOKEN_INVALID))?;

        self.check_single_use_expiry(user.email_verification_expires)?;
        Ok(user)
    }

    fn sign<T: Serialize>(&self, claims: &T, secret: &str) -> AppResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str, secret: &str) -> AppResult<T> {
        // Expiry is checked against the injected clock instead of the system time
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[self.jwt.issuer.as_str()]);
        validation.set_audience(&[self.jwt.audience.as_str()]);

        decode::<T>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            log::debug!("Token rejected: {}", e);
            invalid_token()
        })
    }

    fn check_expiry(&self, exp: i64) -> AppResult<()> {
        if self.clock.now().timestamp() >= exp {
            log::debug!("Token rejected: expired at {}", exp);
            return Err(invalid_token());
        }
        Ok(())
    }

    fn check_single_use_expiry(&self, expires_at: Option<DateTime<Utc>>) -> AppResult<()> {
        match expires_at {
            Some(expires_at) if self.clock.now() >= expires_at => {
                Err(AppError::business(messages::TOKEN_EXPIRED))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, UserStatus, DEFAULT_ROLE};
    use crate::repository::InMemoryUserRepository;
    use crate::utils::clock::MockClock;

    struct Fixture {
        clock: Arc<MockClock>,
        users: Arc<UserService>,
        tokens: TokenService,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new(Utc::now()));
        let users = Arc::new(UserService::new(
            Arc::new(InMemoryUserRepository::new()),
            clock.clone(),
        ));
        let tokens = TokenService::new(
            JwtConfig::new("access-secret", "refresh-secret"),
            &AuthConfig::default(),
            users.clone(),
            clock.clone(),
        );
        Fixture {
            clock,
            users,
            tokens,
        }
    }

    async fn create_user(users: &UserService) -> UserRecord {
        users
            .create(NewUser {
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Alice".to_string(),
                last_name: "Smith".to_string(),
                middle_name: None,
                role: DEFAULT_ROLE.to_string(),
                status: UserStatus::Active,
                email_verified: true,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_expires_in() {
        assert_eq!(parse_expires_in("1h"), 3600);
        assert_eq!(parse_expires_in("15m"), 900);
        assert_eq!(parse_expires_in("45s"), 45);
        assert_eq!(parse_expires_in("7d"), 604_800);
        assert_eq!(parse_expires_in("one hour"), 3600);
        assert_eq!(parse_expires_in("10x"), 3600);
    }

    #[tokio::test]
    async fn test_token_pair_round_trip() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let pair = f.tokens.generate_token_pair(&user).unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);

        let access = f.tokens.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.role, DEFAULT_ROLE);
        assert_eq!(access.iss, JwtConfig::DEFAULT_ISSUER);

        let refresh = f.tokens.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.user_id(), Some(user.id));
        assert!(refresh.family().is_some());
    }

    #[tokio::test]
    async fn test_tokens_are_not_interchangeable() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let pair = f.tokens.generate_token_pair(&user).unwrap();

        assert!(f.tokens.verify_access_token(&pair.refresh_token).is_err());
        assert!(f.tokens.verify_refresh_token(&pair.access_token).is_err());
        assert!(f.tokens.verify_access_token("not.a.jwt").is_err());
    }

    #[tokio::test]
    async fn test_rotated_pair_keeps_family() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let family = Uuid::new_v4();
        let pair = f.tokens.generate_rotated_token_pair(&user, family).unwrap();

        let refresh = f.tokens.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.family(), Some(family));
    }

    #[tokio::test]
    async fn test_expired_access_token_is_generic_unauthorized() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let pair = f.tokens.generate_token_pair(&user).unwrap();

        f.clock.advance(Duration::hours(1));
        match f.tokens.verify_access_token(&pair.access_token) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, messages::TOKEN_INVALID),
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_issuer_is_rejected() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let mut other_config = JwtConfig::new("access-secret", "refresh-secret");
        other_config.issuer = "someone-else".to_string();
        let other = TokenService::new(
            other_config,
            &AuthConfig::default(),
            f.users.clone(),
            f.clock.clone(),
        );

        let pair = other.generate_token_pair(&user).unwrap();
        assert!(f.tokens.verify_access_token(&pair.access_token).is_err());
    }

    #[tokio::test]
    async fn test_password_reset_token_window() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let token = f.tokens.generate_password_reset_token(user.id).await.unwrap();

        let stored = f.users.get_by_id(user.id).await.unwrap();
        assert_eq!(stored.password_reset_token, Some(hash_token(&token)));

        f.clock.advance(Duration::minutes(59));
        let owner = f.tokens.verify_password_reset_token(&token).await.unwrap();
        assert_eq!(owner.id, user.id);

        f.clock.advance(Duration::minutes(2));
        match f.tokens.verify_password_reset_token(&token).await {
            Err(AppError::Business(msg)) => assert_eq!(msg, messages::TOKEN_EXPIRED),
            other => panic!("expected expired token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_reset_token_is_business_error() {
        let f = fixture();
        match f.tokens.verify_password_reset_token("deadbeef").await {
            Err(AppError::Business(msg)) => assert_eq!(msg, messages::TOKEN_INVALID),
            other => panic!("expected invalid token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_email_verification_token_expires() {
        let f = fixture();
        let user = create_user(&f.users).await;
        let token = f
            .tokens
            .generate_email_verification_token(user.id)
            .await
            .unwrap();

        assert!(f.tokens.verify_email_verification_token(&token).await.is_ok());
        f.clock.advance(Duration::hours(24));
        assert!(matches!(
            f.tokens.verify_email_verification_token(&token).await,
            Err(AppError::Business(_))
        ));
    }
}
