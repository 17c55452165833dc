//! Authentication Models
//!
//! Data structures for JWT authentication and session management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;

/// JWT token pair containing access and refresh tokens
///
/// This structure is returned when a user successfully authenticates
/// or refreshes their tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token for API authentication
    pub access_token: String,

    /// Long-lived refresh token for obtaining new token pairs
    pub refresh_token: String,

    /// Token type (always "Bearer" for JWT)
    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl TokenPair {
    /// Create a new token pair
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// JWT claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject - user ID
    pub sub: String,

    pub email: String,

    pub username: String,

    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// JWT ID - unique token identifier
    pub jti: String,

    pub iss: String,

    pub aud: String,
}

/// JWT claims structure for refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject - user ID
    pub sub: String,

    /// Rotation lineage, carried forward on every refresh
    pub token_family: String,

    pub iat: i64,

    pub exp: i64,

    pub jti: String,

    pub iss: String,

    pub aud: String,
}

impl RefreshTokenClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn family(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.token_family).ok()
    }
}

/// Identity extracted from a verified access token
///
/// Attached to request extensions by the auth middleware and used for
/// authorization decisions.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
    /// Token ID for tracking
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

impl UserContext {
    /// Create user context from access token claims
    pub fn from_access_claims(claims: &AccessTokenClaims) -> Result<Self, uuid::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub)?,
            email: claims.email.clone(),
            username: claims.username.clone(),
            role: claims.role.clone(),
            permissions: claims.permissions.clone().unwrap_or_default(),
            token_id: claims.jti.clone(),
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_default(),
        })
    }

    pub fn has_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.role.eq_ignore_ascii_case(role))
    }

    pub fn has_all_permissions(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|permission| self.permissions.iter().any(|p| p == permission))
    }
}

/// Request metadata recorded on sessions
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Response for register and login
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}
