//! HR Auth Administration CLI
//!
//! Operator tasks that run outside the HTTP API: the expired session sweep
//! (meant for cron), account status changes, lockout release and session
//! inspection.

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;

use hr_auth_service::{
    config::AppConfig,
    database::run_migrations,
    models::{UserRecord, UserStatus},
    repository::{PgSessionRepository, PgUserRepository},
    service::{AuthServices, LogEventSink},
    utils::clock::SystemClock,
};

/// HR auth service administration CLI
#[derive(Parser)]
#[command(name = "hr-admin", about = "HR auth service administration CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete sessions whose refresh token has expired
    CleanupSessions,
    /// Activate an account
    Activate(AccountArgs),
    /// Deactivate an account and end all of its sessions
    Deactivate(AccountArgs),
    /// Suspend an account and end all of its sessions
    Suspend(AccountArgs),
    /// Clear failed login attempts and any lockout
    Unlock(AccountArgs),
    /// List the active sessions of an account
    Sessions(AccountArgs),
    /// End every session of an account
    RevokeSessions(AccountArgs),
}

#[derive(Args)]
struct AccountArgs {
    /// Account email address
    email: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    config.validate()?;
    let pool = config.database.create_pool().await?;
    run_migrations(&pool).await?;

    // No cache: changes made here must be visible to the next read
    let services = AuthServices::build(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgSessionRepository::new(pool)),
        None,
        &config,
        Arc::new(SystemClock),
        Arc::new(LogEventSink),
    );

    match cli.command {
        Commands::CleanupSessions => {
            let removed = services.sessions.cleanup_expired_sessions().await?;
            println!("Removed {} expired session(s)", removed);
        }
        Commands::Activate(args) => {
            change_status(&services, &args.email, UserStatus::Active).await?;
        }
        Commands::Deactivate(args) => {
            change_status(&services, &args.email, UserStatus::Inactive).await?;
        }
        Commands::Suspend(args) => {
            change_status(&services, &args.email, UserStatus::Suspended).await?;
        }
        Commands::Unlock(args) => {
            let user = find_account(&services, &args.email).await?;
            let user = services.users.clear_lockout(user.id).await?;
            println!("Lockout cleared");
            print_account(&user);
        }
        Commands::Sessions(args) => {
            let user = find_account(&services, &args.email).await?;
            list_sessions(&services, &user).await?;
        }
        Commands::RevokeSessions(args) => {
            let user = find_account(&services, &args.email).await?;
            let revoked = services.sessions.invalidate_all_user_sessions(user.id).await?;
            println!("Revoked {} session(s) for {}", revoked, user.email);
        }
    }

    Ok(())
}

async fn find_account(services: &AuthServices, email: &str) -> anyhow::Result<UserRecord> {
    services
        .users
        .find_by_email(email)
        .await?
        .with_context(|| format!("No account with email {}", email))
}

async fn change_status(
    services: &AuthServices,
    email: &str,
    status: UserStatus,
) -> anyhow::Result<()> {
    let user = find_account(services, email).await?;
    let (user, revoked) = services.auth.change_account_status(user.id, status).await?;

    print_account(&user);
    if revoked > 0 {
        println!("Revoked {} session(s)", revoked);
    }
    Ok(())
}

async fn list_sessions(services: &AuthServices, user: &UserRecord) -> anyhow::Result<()> {
    let sessions = services.sessions.get_active_sessions(user.id).await?;
    if sessions.is_empty() {
        println!("No active sessions for {}", user.email);
        return Ok(());
    }

    println!(
        "{:<38} {:<16} {:<18} {:<18} {}",
        "ID", "IP", "Last activity", "Expires", "User agent"
    );
    println!("{}", "-".repeat(110));

    for session in sessions {
        println!(
            "{:<38} {:<16} {:<18} {:<18} {}",
            session.id,
            session.ip_address.as_deref().unwrap_or("-"),
            session.last_activity.format("%Y-%m-%d %H:%M"),
            session.expires_at.format("%Y-%m-%d %H:%M"),
            truncate(session.user_agent.as_deref().unwrap_or("-"), 40)
        );
    }

    Ok(())
}

fn print_account(user: &UserRecord) {
    println!("Account: {} ({})", user.email, user.id);
    println!("   Username: {}", user.username);
    println!("   Role: {}", user.role);
    println!("   Status: {:?}", user.status);
    println!("   Email verified: {}", user.email_verified);
    println!("   Failed logins: {}", user.login_attempts);
    if let Some(until) = user.locked_until {
        println!("   Locked until: {}", until);
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
