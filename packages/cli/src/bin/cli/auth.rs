// ABOUTME: CLI commands for connecting a Google account
// ABOUTME: Supports login, logout, status, token printing, and forced refresh

use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::*;
use gcal_auth::{AuthError, AuthManager, AuthStatus};
use gcal_config::constants;
use std::process;
use tracing::{debug, warn};

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with Google in the browser
    Login,

    /// Forget stored tokens and abandon any pending login
    Logout,

    /// Show configuration and token state
    Status,

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Force an access token refresh
    Refresh,
}

impl AuthCommands {
    pub async fn execute(&self) {
        let manager = init_manager().await;

        match self {
            AuthCommands::Login => login_command(&manager).await,
            AuthCommands::Logout => logout_command(&manager).await,
            AuthCommands::Status => status_command(&manager).await,
            AuthCommands::Token => token_command(&manager).await,
            AuthCommands::Refresh => refresh_command(&manager).await,
        }
    }
}

async fn init_manager() -> AuthManager {
    match AuthManager::new_default().await {
        Ok(m) => {
            debug!(
                "Auth manager ready (custom client: {})",
                m.settings().use_custom_client
            );
            m
        }
        Err(e) => {
            eprintln!(
                "{} Failed to initialize auth manager: {}",
                "✗".red().bold(),
                e
            );
            process::exit(1);
        }
    }
}

async fn login_command(manager: &AuthManager) {
    println!("{}", "🔐 Connecting your Google account...".bold().cyan());

    let attempt = match manager.login().await {
        Ok(attempt) => attempt,
        Err(e) => fail("Login could not start", &e),
    };

    println!("   A browser window should open. If it does not, visit:");
    println!();
    println!("   {}", attempt.auth_url.cyan());
    println!();
    println!(
        "   Waiting up to {} seconds for Google to redirect back...",
        manager.settings().session_timeout.as_secs()
    );

    let result = tokio::select! {
        result = attempt.finish() => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling pending login");
            manager.cancel_login();
            Err(AuthError::LoginCancelled)
        }
    };

    match result {
        Ok(()) => {
            println!();
            println!("{} Google account connected", "✓".green().bold());
        }
        Err(e) => fail("Login failed", &e),
    }
}

async fn logout_command(manager: &AuthManager) {
    println!("{}", "🔓 Logging out from Google...".bold().cyan());

    match manager.logout().await {
        Ok(()) => println!("{} Successfully logged out", "✓".green().bold()),
        Err(e) => fail("Logout failed", &e),
    }
}

async fn status_command(manager: &AuthManager) {
    let status = match manager.status().await {
        Ok(status) => status,
        Err(e) => fail("Failed to get status", &e),
    };

    println!("{}", "🔐 Google Calendar Authentication Status".bold().cyan());
    println!();
    for line in status_lines(&status, Utc::now().timestamp_millis()) {
        println!("  {}", line);
    }
    println!();

    if !status.configured {
        println!(
            "Set {} (or {} with {} and {}) to configure",
            constants::GCAL_OAUTH_SERVER.yellow(),
            constants::GCAL_USE_CUSTOM_CLIENT.yellow(),
            constants::GCAL_GOOGLE_CLIENT_ID.yellow(),
            constants::GCAL_GOOGLE_CLIENT_SECRET.yellow()
        );
    } else if !status.logged_in {
        println!("Use {} to authenticate", "gcal auth login".yellow());
    }
}

async fn token_command(manager: &AuthManager) {
    match manager.ensure_access_token().await {
        Ok(token) => println!("{}", token),
        Err(e) => fail("No access token available", &e),
    }
}

async fn refresh_command(manager: &AuthManager) {
    println!("{}", "🔄 Refreshing access token...".bold().cyan());

    if let Err(e) = manager.refresh().await {
        fail("Refresh failed", &e);
    }

    match manager.status().await {
        Ok(status) => {
            let expires = status
                .expires_at_ms
                .map(format_timestamp_ms)
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "{} Access token refreshed, expires {}",
                "✓".green().bold(),
                expires.green()
            );
        }
        Err(_) => println!("{} Access token refreshed", "✓".green().bold()),
    }
}

fn fail(context: &str, error: &AuthError) -> ! {
    eprintln!("{} {}: {}", "✗".red().bold(), context, error);
    if error.requires_login() {
        eprintln!();
        eprintln!(
            "Check your configuration, then run {}",
            "gcal auth login".yellow()
        );
    }
    process::exit(1);
}

fn status_lines(status: &AuthStatus, now_ms: i64) -> Vec<String> {
    let mark = |ok: bool| {
        if ok {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        }
    };

    let client = if status.use_custom_client {
        "custom OAuth client"
    } else {
        "hosted broker"
    };

    let mut lines = vec![
        format!("{} Configured ({})", mark(status.configured), client),
        format!("{} Logged in", mark(status.logged_in)),
        format!("{} Access token valid", mark(status.access_token_valid)),
    ];

    if let Some(expires_at) = status.expires_at_ms {
        let expires = format_timestamp_ms(expires_at);
        if expires_at <= now_ms {
            lines.push(format!("  Expires: {} {}", expires.red(), "(expired)".red()));
        } else {
            lines.push(format!("  Expires: {}", expires.green()));
        }
    }

    if status.login_pending {
        lines.push(format!("  {}", "Login in progress".yellow()));
    }

    lines
}

fn format_timestamp_ms(timestamp_ms: i64) -> String {
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "Invalid date".to_string(),
    }
}
