//! HTTP Request Handlers
//!
//! Axum handlers for the authentication endpoints. Handlers stay thin: they
//! extract the request, call the authentication service and wrap the result.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{header::USER_AGENT, request::Parts, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::middleware::{require_roles, AuthUser},
    models::{
        AuthResponse, ChangePasswordRequest, ClientInfo, HealthCheckResponse, LoginRequest,
        MessageResponse, RefreshTokenRequest, RegisterRequest, RequestPasswordResetRequest,
        ResetPasswordRequest, SessionInfo, TokenPair, User, UserContext, UserStatus,
        VerifyEmailRequest, USER_ADMIN_ROLES,
    },
    service::{messages, AuthServices, AuthenticationService, TokenService, UserService},
    utils::error::AppResult,
    VERSION,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthenticationService>,
    pub users: Arc<UserService>,
    pub tokens: Arc<TokenService>,
}

impl From<&AuthServices> for AppState {
    fn from(services: &AuthServices) -> Self {
        Self {
            auth: services.auth.clone(),
            users: services.users.clone(),
            tokens: services.tokens.clone(),
        }
    }
}

/// Standard success response wrapper
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

type ApiResult<T> = AppResult<Json<SuccessResponse<T>>>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(SuccessResponse::new(data)))
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer
fn client_ip(headers: &HeaderMap, parts: &Parts) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| header("x-real-ip").map(str::to_string))
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = client_ip(&parts.headers, parts);
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientInfo {
            ip_address,
            user_agent,
        })
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthCheckResponse> {
    state.users.health_check().await?;

    ok(HealthCheckResponse {
        status: "healthy".to_string(),
        timestamp: state.users.now(),
        version: VERSION.to_string(),
    })
}

/// Register a new account
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<SuccessResponse<AuthResponse>>)> {
    let outcome = state.auth.register(request, &client).await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new(outcome.response)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    ok(state.auth.login(request, &client).await?)
}

/// End the session identified by the refresh token in the body
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<RefreshTokenRequest>,
) -> ApiResult<MessageResponse> {
    state.auth.logout(user.user_id, &request.refresh_token).await?;
    ok(MessageResponse::new(messages::LOGOUT_SUCCESS))
}

pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<MessageResponse> {
    state.auth.logout_all_devices(user.user_id).await?;
    ok(MessageResponse::new(messages::LOGOUT_ALL_SUCCESS))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> ApiResult<TokenPair> {
    ok(state.auth.refresh_tokens(&request.refresh_token).await?)
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<MessageResponse> {
    state.auth.change_password(user.user_id, &request).await?;
    ok(MessageResponse::new(messages::PASSWORD_CHANGED))
}

/// Always answers the same way so callers cannot discover which accounts exist
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<RequestPasswordResetRequest>,
) -> ApiResult<MessageResponse> {
    request.validate()?;

    state.auth.request_password_reset(&request.email).await?;
    ok(MessageResponse::new(messages::PASSWORD_RESET_EMAIL_SENT))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<MessageResponse> {
    state.auth.reset_password(&request).await?;
    ok(MessageResponse::new(messages::PASSWORD_RESET_SUCCESS))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<VerifyEmailRequest>,
) -> ApiResult<User> {
    ok(state.auth.verify_email(&request.token).await?)
}

/// Profile of the signed-in user
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<User> {
    ok(state.auth.current_user(user.user_id).await?)
}

pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<SessionInfo>> {
    ok(state.auth.list_sessions(user.user_id).await?)
}


/// Look up another account (administrators only)
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<User> {
    require_roles(&caller, USER_ADMIN_ROLES)?;
    ok(state.auth.get_user(user_id).await?)
}

pub async fn activate_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<User> {
    set_user_status(&state, &caller, user_id, UserStatus::Active).await
}

/// Deactivate an account and end its sessions
pub async fn deactivate_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<User> {
    set_user_status(&state, &caller, user_id, UserStatus::Inactive).await
}

/// Suspend an account and end its sessions
pub async fn suspend_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<User> {
    set_user_status(&state, &caller, user_id, UserStatus::Suspended).await
}

async fn set_user_status(
    state: &AppState,
    caller: &UserContext,
    user_id: Uuid,
    status: UserStatus,
) -> ApiResult<User> {
    require_roles(caller, USER_ADMIN_ROLES)?;
    let (user, _) = state.auth.change_account_status(user_id, status).await?;
    log::info!(
        "User {} set account {} to {}",
        caller.user_id,
        user_id,
        status.as_str()
    );
    ok(user.into())
}
