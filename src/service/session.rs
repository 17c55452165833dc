//! Session Service
//!
//! Server-side sessions keyed by the SHA-256 of the refresh token. Each
//! session belongs to a token family; rotating a refresh token retires the
//! old row and carries the family forward. Presenting a token whose row was
//! retired by rotation revokes the whole family; tokens ended by logout or
//! revocation are simply rejected.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ClientInfo, NewSession, Session};
use crate::repository::SessionRepository;
use crate::service::audit::{SecurityEvent, SecurityEventKind, SecurityEventSink};
use crate::service::messages;
use crate::service::token::TokenService;
use crate::utils::clock::Clock;
use crate::utils::error::{AppError, AppResult};
use crate::utils::security::hash_token;

/// Default session lifetime in days
pub const DEFAULT_SESSION_EXPIRY_DAYS: i64 = 7;

pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    tokens: Arc<TokenService>,
    events: Arc<dyn SecurityEventSink>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        tokens: Arc<TokenService>,
        events: Arc<dyn SecurityEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            tokens,
            events,
            clock,
            session_ttl: Duration::days(DEFAULT_SESSION_EXPIRY_DAYS),
        }
    }

    pub fn with_session_lifetime(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Open a session for a freshly issued refresh token
    pub async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> AppResult<Session> {
        let token_family = self
            .tokens
            .verify_refresh_token(refresh_token)?
            .family()
            .unwrap_or_else(Uuid::new_v4);
        let now = self.clock.now();

        self.sessions
            .create(NewSession {
                user_id,
                token_hash: hash_token(refresh_token),
                token_family,
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
                expires_at: now + self.session_ttl,
                created_at: now,
            })
            .await
    }

    /// Resolve a live session and record activity on it
    pub async fn validate_session(&self, refresh_token: &str) -> AppResult<Session> {
        let now = self.clock.now();
        let mut session = self
            .sessions
            .find_by_token_hash(&hash_token(refresh_token))
            .await?
            .filter(|s| s.is_valid(now))
            .ok_or_else(|| AppError::unauthorized(messages::TOKEN_INVALID))?;

        self.sessions.touch(session.id, now).await?;
        session.last_activity = now;
        Ok(session)
    }

    pub async fn find_session(&self, refresh_token: &str) -> AppResult<Option<Session>> {
        self.sessions
            .find_by_token_hash(&hash_token(refresh_token))
            .await
    }

    /// Deactivate the session of `refresh_token`; unknown tokens are ignored
    pub async fn invalidate_session(&self, refresh_token: &str) -> AppResult<()> {
        if let Some(session) = self.find_session(refresh_token).await? {
            self.sessions.deactivate(session.id).await?;
        }
        Ok(())
    }

    /// Deactivate the session only when it belongs to `user_id`
    pub async fn invalidate_user_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> AppResult<bool> {
        match self.find_session(refresh_token).await? {
            Some(session) if session.user_id == user_id => {
                self.sessions.deactivate(session.id).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn invalidate_all_user_sessions(&self, user_id: Uuid) -> AppResult<u64> {
        self.sessions.deactivate_all_for_user(user_id, None).await
    }

    /// Deactivate every session of the user except the one holding `keep_token`
    pub async fn invalidate_other_user_sessions(
        &self,
        user_id: Uuid,
        keep_token: &str,
    ) -> AppResult<u64> {
        let keep_hash = hash_token(keep_token);
        self.sessions
            .deactivate_all_for_user(user_id, Some(&keep_hash))
            .await
    }

    /// Exchange `old_token`'s session for one bound to `new_token`
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
        new_token: &str,
    ) -> AppResult<Session> {
        let now = self.clock.now();
        let session = self
            .find_session(old_token)
            .await?
            .ok_or_else(|| AppError::unauthorized(messages::TOKEN_INVALID))?;

        if !session.is_active {
            if !session.was_rotated() {
                log::debug!("Refresh attempted with ended session {}", session.id);
                return Err(AppError::unauthorized(messages::TOKEN_INVALID));
            }

            let revoked = self.sessions.deactivate_family(session.token_family).await?;
            log::warn!(
                "Retired refresh token replayed for user {}; revoked {} session(s) in family {}",
                session.user_id,
                revoked,
                session.token_family
            );
            self.events.record(
                SecurityEvent::new(SecurityEventKind::RefreshTokenReuse, now)
                    .user(session.user_id)
                    .client(session.ip_address.clone(), session.user_agent.clone())
                    .detail(format!("family={} revoked={}", session.token_family, revoked)),
            );
            return Err(AppError::unauthorized(messages::TOKEN_INVALID));
        }
        if session.is_expired(now) {
            return Err(AppError::unauthorized(messages::TOKEN_INVALID));
        }

        let session_id = session.id;
        self.sessions
            .rotate(
                session_id,
                NewSession {
                    user_id: session.user_id,
                    token_hash: hash_token(new_token),
                    token_family: session.token_family,
                    ip_address: session.ip_address,
                    user_agent: session.user_agent,
                    expires_at: now + self.session_ttl,
                    created_at: now,
                },
            )
            .await?
            .ok_or_else(|| {
                log::warn!("Concurrent refresh lost the race for session {}", session_id);
                AppError::unauthorized(messages::TOKEN_INVALID)
            })
    }

    /// Delete expired rows, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> AppResult<u64> {
        let removed = self.sessions.delete_expired(self.clock.now()).await?;
        log::info!("Removed {} expired session(s)", removed);
        Ok(removed)
    }

    pub async fn get_active_sessions(&self, user_id: Uuid) -> AppResult<Vec<Session>> {
        self.sessions
            .find_active_by_user(user_id, self.clock.now())
            .await
    }

    pub async fn count_active_sessions(&self, user_id: Uuid) -> AppResult<i64> {
        self.sessions
            .count_active_by_user(user_id, self.clock.now())
            .await
    }
}
