//! Authentication Middleware
//!
//! Bearer token authentication plus the role and permission checks handlers
//! use for authorization.

use crate::api::handlers::AppState;
use crate::models::{UserContext, UserStatus};
use crate::service::messages;
use crate::utils::error::{AppError, AppResult};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Extension type for storing authenticated user context in request extensions
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserContext);

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware that validates the access token and attaches the user context
///
/// Missing, malformed, expired and forged tokens all produce the same 401.
/// The account is reloaded on every request: a deleted, deactivated or
/// suspended account is rejected while its token is still unexpired, and the
/// role comes from the stored account rather than the token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers).ok_or_else(|| AppError::unauthorized(messages::UNAUTHORIZED))?;

    let mut user_context = state.tokens.validate_access_token(token)?;
    let user = state
        .users
        .find_by_id(user_context.user_id)
        .await?
        .filter(|user| matches!(user.status, UserStatus::Active | UserStatus::Pending))
        .ok_or_else(|| {
            log::debug!("Access token for unavailable account {}", user_context.user_id);
            AppError::unauthorized(messages::UNAUTHORIZED)
        })?;

    user_context.role = user.role;
    request.extensions_mut().insert(AuthUser(user_context));

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized(messages::UNAUTHORIZED))
    }
}

/// Allow the request only if the user holds one of `roles` (case-insensitive)
pub fn require_roles(user: &UserContext, roles: &[&str]) -> AppResult<()> {
    if user.has_role(roles) {
        Ok(())
    } else {
        log::debug!(
            "User {} with role {} denied; requires one of {:?}",
            user.user_id,
            user.role,
            roles
        );
        Err(AppError::Forbidden(messages::FORBIDDEN.to_string()))
    }
}

/// Allow the request only if the user holds every permission in `permissions`
pub fn require_permissions(user: &UserContext, permissions: &[&str]) -> AppResult<()> {
    if user.has_all_permissions(permissions) {
        Ok(())
    } else {
        Err(AppError::Forbidden(messages::FORBIDDEN.to_string()))
    }
}
