//! API Route Definitions
//!
//! HTTP routes for the authentication endpoints. The RouterBuilder allows
//! selective enabling of endpoint groups, so a deployment can expose only the
//! flows it needs. Routes that need a signed-in caller are wrapped with the
//! bearer token middleware.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};

use super::handlers::*;
use super::middleware::auth_middleware;

/// Builder for creating API routes with configurable endpoints
#[derive(Default)]
pub struct RouterBuilder {
    /// GET /health
    health_check: bool,
    /// POST /auth/register
    register: bool,
    /// POST /auth/login
    login: bool,
    /// POST /auth/refresh
    refresh_token: bool,
    /// POST /auth/logout and POST /auth/logout-all
    logout: bool,
    /// POST /auth/password-reset/request and POST /auth/password-reset/confirm
    password_reset: bool,
    /// POST /auth/verify-email
    verify_email: bool,
    /// POST /auth/change-password
    change_password: bool,
    /// GET /auth/me and GET /auth/sessions
    account: bool,
    /// GET /users/{id} and PUT /users/{id}/{activate,deactivate,suspend}
    user_admin: bool,
}

impl RouterBuilder {
    /// Creates a new router builder with all routes disabled by default
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router builder with all routes enabled
    pub fn with_all_routes() -> Self {
        Self {
            health_check: true,
            register: true,
            login: true,
            refresh_token: true,
            logout: true,
            password_reset: true,
            verify_email: true,
            change_password: true,
            account: true,
            user_admin: true,
        }
    }

    /// Sign-in flows only: no self-registration or password reset
    ///
    /// Suited to deployments where accounts are provisioned by HR staff.
    pub fn with_session_routes() -> Self {
        Self {
            health_check: true,
            login: true,
            refresh_token: true,
            logout: true,
            account: true,
            ..Self::default()
        }
    }

    /// Creates router with only the health check endpoint
    pub fn with_minimal_routes() -> Self {
        Self {
            health_check: true,
            ..Self::default()
        }
    }

    pub fn health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    pub fn register(mut self, enabled: bool) -> Self {
        self.register = enabled;
        self
    }

    pub fn login(mut self, enabled: bool) -> Self {
        self.login = enabled;
        self
    }

    pub fn refresh_token(mut self, enabled: bool) -> Self {
        self.refresh_token = enabled;
        self
    }

    pub fn logout(mut self, enabled: bool) -> Self {
        self.logout = enabled;
        self
    }

    pub fn password_reset(mut self, enabled: bool) -> Self {
        self.password_reset = enabled;
        self
    }

    pub fn verify_email(mut self, enabled: bool) -> Self {
        self.verify_email = enabled;
        self
    }

    pub fn change_password(mut self, enabled: bool) -> Self {
        self.change_password = enabled;
        self
    }

    pub fn account(mut self, enabled: bool) -> Self {
        self.account = enabled;
        self
    }

    /// Account lookup and status changes for SUPER_ADMIN and HR_ADMIN callers
    pub fn user_admin(mut self, enabled: bool) -> Self {
        self.user_admin = enabled;
        self
    }

    fn has_protected_routes(&self) -> bool {
        self.logout || self.change_password || self.account || self.user_admin
    }

    /// Builds the Axum router with the configured routes
    ///
    /// `state` is handed to the bearer middleware; the returned router still
    /// needs `.with_state(state)`.
    pub fn build(self, state: &AppState) -> Router<AppState> {
        let mut public = Router::new();

        if self.health_check {
            public = public.route("/health", get(health_check));
        }

        if self.register {
            public = public.route("/auth/register", post(register));
        }

        if self.login {
            public = public.route("/auth/login", post(login));
        }

        if self.refresh_token {
            public = public.route("/auth/refresh", post(refresh_token));
        }

        if self.password_reset {
            public = public
                .route("/auth/password-reset/request", post(request_password_reset))
                .route("/auth/password-reset/confirm", post(reset_password));
        }

        if self.verify_email {
            public = public.route("/auth/verify-email", post(verify_email));
        }

        // route_layer panics on a router without routes
        if !self.has_protected_routes() {
            return public;
        }

        let mut protected = Router::new();

        if self.logout {
            protected = protected
                .route("/auth/logout", post(logout))
                .route("/auth/logout-all", post(logout_all));
        }

        if self.change_password {
            protected = protected.route("/auth/change-password", post(change_password));
        }

        if self.account {
            protected = protected
                .route("/auth/me", get(current_user))
                .route("/auth/sessions", get(list_sessions));
        }

        if self.user_admin {
            protected = protected
                .route("/users/{id}", get(get_user))
                .route("/users/{id}/activate", put(activate_user))
                .route("/users/{id}/deactivate", put(deactivate_user))
                .route("/users/{id}/suspend", put(suspend_user));
        }

        let protected = protected.route_layer(from_fn_with_state(state.clone(), auth_middleware));

        public.merge(protected)
    }
}

/// Creates all API routes
pub fn create_routes(state: &AppState) -> Router<AppState> {
    RouterBuilder::with_all_routes().build(state)
}
