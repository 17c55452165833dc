//! Configuration Module
//!
//! Centralized configuration for the auth service: server, database, token
//! signing, authentication policy and cache settings, all read from the
//! environment (a `.env` file is loaded by the binaries first).

use chrono::Duration;

use crate::database::DatabaseConfig;
use crate::repository::LockoutPolicy;
use crate::utils::error::{AppError, AppResult};
use crate::utils::security::DEFAULT_BCRYPT_COST;

/// Environment variable helpers
pub mod env {
    use std::env;
    use std::str::FromStr;

    use crate::utils::error::{AppError, AppResult};

    fn get_parsed<T: FromStr>(key: &str, default: T) -> T {
        env::var(key)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as string with default
    pub fn get_string(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    pub fn get_u16(key: &str, default: u16) -> u16 {
        get_parsed(key, default)
    }

    pub fn get_u32(key: &str, default: u32) -> u32 {
        get_parsed(key, default)
    }

    pub fn get_u64(key: &str, default: u64) -> u64 {
        get_parsed(key, default)
    }

    pub fn get_i32(key: &str, default: i32) -> i32 {
        get_parsed(key, default)
    }

    pub fn get_i64(key: &str, default: i64) -> i64 {
        get_parsed(key, default)
    }

    /// Check if environment variable is set
    pub fn is_set(key: &str) -> bool {
        env::var(key).is_ok()
    }

    /// Get a required environment variable
    pub fn get_required(key: &str) -> AppResult<String> {
        env::var(key).map_err(|_| {
            AppError::Configuration(format!("Required environment variable {} is not set", key))
        })
    }
}

/// Longest lifetime accepted for any configured token, session or lockout
pub const MAX_LIFETIME_DAYS: i64 = 3650;

/// Parse a `<n><unit>` duration string, unit one of `s`, `m`, `h`, `d`
///
/// Amounts too large to represent are rejected like any other bad input.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let unit = value.chars().last()?;
    let amount: i64 = value[..value.len() - unit.len_utf8()].parse().ok()?;
    if amount < 0 {
        return None;
    }

    match unit {
        's' => Duration::try_seconds(amount),
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        _ => None,
    }
}

fn within_lifetime_limit(duration: Option<Duration>) -> bool {
    duration.is_some_and(|d| d > Duration::zero() && d <= Duration::days(MAX_LIFETIME_DAYS))
}

/// Application configuration combining all service configurations
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

/// Token signing configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token lifetime as a duration string, e.g. `1h`
    pub access_expires_in: String,
    /// Refresh token lifetime as a duration string, e.g. `7d`
    pub refresh_expires_in: String,
    pub issuer: String,
    pub audience: String,
}

/// Authentication policy
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub session_expiry_days: i64,
    pub max_login_attempts: i32,
    pub lockout_minutes: i64,
    pub password_reset_expiry_minutes: i64,
    pub email_verification_expiry_hours: i64,
}

/// User cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub user_ttl_seconds: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::get_string("SERVER_HOST", &defaults.host),
            port: env::get_u16("SERVER_PORT", defaults.port),
            log_level: env::get_string("LOG_LEVEL", &defaults.log_level),
        }
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl JwtConfig {
    pub const DEFAULT_ISSUER: &'static str = "hr-management-system";
    pub const DEFAULT_AUDIENCE: &'static str = "hr-management-users";

    /// Configuration with the given secrets and default lifetimes, issuer and audience
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_expires_in: "1h".to_string(),
            refresh_expires_in: "7d".to_string(),
            issuer: Self::DEFAULT_ISSUER.to_string(),
            audience: Self::DEFAULT_AUDIENCE.to_string(),
        }
    }

    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            access_secret: env::get_required("JWT_SECRET")?,
            refresh_secret: env::get_required("JWT_REFRESH_SECRET")?,
            access_expires_in: env::get_string("JWT_EXPIRATION", "1h"),
            refresh_expires_in: env::get_string("JWT_REFRESH_EXPIRATION", "7d"),
            issuer: env::get_string("JWT_ISSUER", Self::DEFAULT_ISSUER),
            audience: env::get_string("JWT_AUDIENCE", Self::DEFAULT_AUDIENCE),
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            session_expiry_days: 7,
            max_login_attempts: 5,
            lockout_minutes: 30,
            password_reset_expiry_minutes: 60,
            email_verification_expiry_hours: 24,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bcrypt_cost: env::get_u32("BCRYPT_ROUNDS", defaults.bcrypt_cost),
            session_expiry_days: env::get_i64("SESSION_EXPIRY_DAYS", defaults.session_expiry_days),
            max_login_attempts: env::get_i32("MAX_LOGIN_ATTEMPTS", defaults.max_login_attempts),
            lockout_minutes: env::get_i64("LOCKOUT_MINUTES", defaults.lockout_minutes),
            password_reset_expiry_minutes: env::get_i64(
                "PASSWORD_RESET_EXPIRY_MINUTES",
                defaults.password_reset_expiry_minutes,
            ),
            email_verification_expiry_hours: env::get_i64(
                "EMAIL_VERIFICATION_EXPIRY_HOURS",
                defaults.email_verification_expiry_hours,
            ),
        }
    }

    // Out-of-range values fall back to the defaults; `AppConfig::validate` reports them

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.max_login_attempts,
            lock_duration: Duration::try_minutes(self.lockout_minutes)
                .unwrap_or_else(|| Duration::minutes(Self::default().lockout_minutes)),
        }
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::try_days(self.session_expiry_days)
            .unwrap_or_else(|| Duration::days(Self::default().session_expiry_days))
    }

    pub fn password_reset_lifetime(&self) -> Duration {
        Duration::try_minutes(self.password_reset_expiry_minutes)
            .unwrap_or_else(|| Duration::minutes(Self::default().password_reset_expiry_minutes))
    }

    pub fn email_verification_lifetime(&self) -> Duration {
        Duration::try_hours(self.email_verification_expiry_hours).unwrap_or_else(|| {
            Duration::hours(Self::default().email_verification_expiry_hours)
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            user_ttl_seconds: env::get_i64("USER_CACHE_TTL_SECONDS", Self::default().user_ttl_seconds),
        }
    }

    pub fn user_ttl(&self) -> Duration {
        Duration::try_seconds(self.user_ttl_seconds)
            .unwrap_or_else(|| Duration::seconds(Self::default().user_ttl_seconds))
    }
}

impl AppConfig {
    /// Load complete application configuration from environment
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            auth: AuthConfig::from_env(),
            cache: CacheConfig::from_env(),
        })
    }

    /// Validate the complete configuration
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: &str| Err(AppError::Configuration(msg.to_string()));

        if self.server.port == 0 {
            return invalid("Server port must be greater than 0");
        }

        if self.database.max_connections == 0 {
            return invalid("Database max_connections must be greater than 0");
        }
        if self.database.min_connections > self.database.max_connections {
            return invalid("Database min_connections cannot be greater than max_connections");
        }

        if self.jwt.access_secret.is_empty() {
            return invalid("JWT access secret cannot be empty");
        }
        if self.jwt.refresh_secret.is_empty() {
            return invalid("JWT refresh secret cannot be empty");
        }
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return invalid("JWT access and refresh secrets must be different");
        }
        if !within_lifetime_limit(parse_duration(&self.jwt.access_expires_in)) {
            return invalid("JWT_EXPIRATION must look like 15m, 1h or 7d, at most 3650d");
        }
        if !within_lifetime_limit(parse_duration(&self.jwt.refresh_expires_in)) {
            return invalid("JWT_REFRESH_EXPIRATION must look like 15m, 1h or 7d, at most 3650d");
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return invalid("BCRYPT_ROUNDS must be between 4 and 31");
        }
        if self.auth.max_login_attempts <= 0 {
            return invalid("MAX_LOGIN_ATTEMPTS must be greater than 0");
        }
        if !within_lifetime_limit(Duration::try_days(self.auth.session_expiry_days)) {
            return invalid("SESSION_EXPIRY_DAYS must be between 1 and 3650");
        }
        if !within_lifetime_limit(Duration::try_minutes(self.auth.lockout_minutes)) {
            return invalid("LOCKOUT_MINUTES must be greater than 0 and at most 3650 days");
        }
        if !within_lifetime_limit(Duration::try_minutes(self.auth.password_reset_expiry_minutes)) {
            return invalid("PASSWORD_RESET_EXPIRY_MINUTES must be greater than 0 and at most 3650 days");
        }
        if !within_lifetime_limit(Duration::try_hours(self.auth.email_verification_expiry_hours)) {
            return invalid(
                "EMAIL_VERIFICATION_EXPIRY_HOURS must be greater than 0 and at most 3650 days",
            );
        }
        if !within_lifetime_limit(Duration::try_seconds(self.cache.user_ttl_seconds)) {
            return invalid("USER_CACHE_TTL_SECONDS must be greater than 0 and at most 3650 days");
        }

        Ok(())
    }
}
