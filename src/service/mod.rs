//! Service Layer
//!
//! Business logic for authentication and session management. Services are
//! wired explicitly by `AuthServices::build`; stores, cache, clock and event
//! sink are passed in so tests can swap them for in-memory versions.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod messages;
pub mod session;
pub mod token;
pub mod user;
pub mod validator;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::repository::{SessionRepository, UserRepository};
use crate::utils::clock::Clock;

// Re-export services
pub use audit::{LogEventSink, RecordingEventSink, SecurityEvent, SecurityEventKind, SecurityEventSink};
pub use auth::{AuthenticationService, RegistrationOutcome};
pub use cache::{Cache, InMemoryCache};
pub use session::SessionService;
pub use token::TokenService;
pub use user::UserService;
pub use validator::AuthValidator;

/// The assembled service graph
#[derive(Clone)]
pub struct AuthServices {
    pub users: Arc<UserService>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionService>,
    pub auth: Arc<AuthenticationService>,
}

impl AuthServices {
    pub fn build(
        user_store: Arc<dyn UserRepository>,
        session_store: Arc<dyn SessionRepository>,
        cache: Option<Arc<dyn Cache>>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn SecurityEventSink>,
    ) -> Self {
        let mut users = UserService::new(user_store, clock.clone())
            .with_lockout_policy(config.auth.lockout_policy());
        if let Some(cache) = cache {
            users = users.with_cache(cache, config.cache.user_ttl());
        }
        let users = Arc::new(users);

        let tokens = Arc::new(TokenService::new(
            config.jwt.clone(),
            &config.auth,
            users.clone(),
            clock.clone(),
        ));

        let sessions = Arc::new(
            SessionService::new(session_store, tokens.clone(), events.clone(), clock)
                .with_session_lifetime(config.auth.session_lifetime()),
        );

        let auth = Arc::new(
            AuthenticationService::new(users.clone(), tokens.clone(), sessions.clone(), events)
                .with_bcrypt_cost(config.auth.bcrypt_cost),
        );

        Self {
            users,
            tokens,
            sessions,
            auth,
        }
    }
}
