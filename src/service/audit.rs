//! Security Audit Events
//!
//! Fire-and-forget notifications for security-relevant authentication events.
//! Sinks never fail the operation that emitted the event and are never read
//! back by the auth flows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// Authentication event types
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    Registration,
    LoginSuccess,
    LoginFailure,
    AccountLocked,
    Logout,
    LogoutAll,
    TokenRefresh,
    /// A retired refresh token was presented again
    RefreshTokenReuse,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
    EmailVerified,
    /// An administrator activated, deactivated or suspended an account
    AccountStatusChanged,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::AccountLocked => "account_locked",
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::TokenRefresh => "token_refresh",
            Self::RefreshTokenReuse => "refresh_token_reuse",
            Self::PasswordChanged => "password_changed",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordReset => "password_reset",
            Self::EmailVerified => "email_verified",
            Self::AccountStatusChanged => "account_status_changed",
        }
    }

    /// Check if this event type should be surfaced as a warning
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Self::LoginFailure | Self::AccountLocked | Self::RefreshTokenReuse
        )
    }
}

/// Audit log entry for an authentication event
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            user_id: None,
            ip_address: None,
            user_agent: None,
            detail: None,
            occurred_at,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Output sink for security events
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Writes events through the `log` facade under the `security_audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl SecurityEventSink for LogEventSink {
    fn record(&self, event: SecurityEvent) {
        let user = event
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let ip = event.ip_address.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");

        if event.kind.is_alert() {
            log::warn!(
                target: "security_audit",
                "{} user={} ip={} {}",
                event.kind.as_str(),
                user,
                ip,
                detail
            );
        } else {
            log::info!(
                target: "security_audit",
                "{} user={} ip={} {}",
                event.kind.as_str(),
                user,
                ip,
                detail
            );
        }
    }
}

/// Keeps every event in memory so tests can assert on them
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl SecurityEventSink for RecordingEventSink {
    fn record(&self, event: SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
