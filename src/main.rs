//! HR Auth Service Server
//!
//! Runs the authentication API with every route enabled, backed by
//! PostgreSQL and an in-process user cache.

use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use hr_auth_service::{
    api::{AppState, RouterBuilder},
    config::AppConfig,
    database::run_migrations,
    repository::{PgSessionRepository, PgUserRepository},
    service::{AuthServices, InMemoryCache, LogEventSink},
    utils::clock::SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    let config = AppConfig::from_env()?;

    // RUST_LOG wins over LOG_LEVEL when both are set
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.server.log_level.as_str()),
    )
    .init();

    log::info!("Starting HR Auth Service v{}", hr_auth_service::VERSION);
    config.validate()?;

    let pool = config.database.create_pool().await?;
    log::info!("Running database migrations...");
    run_migrations(&pool).await?;

    let clock = Arc::new(SystemClock);
    let services = AuthServices::build(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgSessionRepository::new(pool)),
        Some(Arc::new(InMemoryCache::new(clock.clone()))),
        &config,
        clock,
        Arc::new(LogEventSink),
    );

    let state = AppState::from(&services);
    let app = RouterBuilder::with_all_routes()
        .build(&state)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .into_inner(),
        );

    let bind_addr = config.server.bind_address();
    log::info!("Listening on {}", bind_addr);
    log::info!(
        "Access tokens expire after {}, refresh tokens after {}",
        config.jwt.access_expires_in,
        config.jwt.refresh_expires_in
    );
    log::info!(
        "Lockout after {} failed logins for {} minutes",
        config.auth.max_login_attempts,
        config.auth.lockout_minutes
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
