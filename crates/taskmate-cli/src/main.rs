//! Taskmate CLI - drive the authentication flow from a terminal.
//!
//! Every command restores the stored session first, the same way the
//! mobile app does at start-up, then performs one authentication action.

mod commands;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use taskmate_core::{ApiClient, Config, ProfileStore, SecretStore, SessionManager};

use commands::Command;

/// Log file written inside the cache directory
const LOG_FILE: &str = "taskmate.log";

/// Set to mirror logs on stderr
const LOG_STDERR_ENV: &str = "TASKMATE_LOG_STDERR";

/// Initialize the tracing subscriber for logging.
/// Logs go to a file in `log_dir`; the returned guard flushes it on drop.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = std::env::var_os(LOG_STDERR_ENV).is_some();

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };
    let stderr_layer = (stderr || file_layer.is_none()).then(|| fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

fn usage() -> &'static str {
    "Usage: taskmate <command>\n\
     \n\
     Commands:\n  \
       login [email]            Sign in with email and password\n  \
       register <name> <email>  Create an account\n  \
       forgot-password <email>  Email a password reset link\n  \
       reset-password <token>   Set a new password with a reset token\n  \
       resume <link>            Continue from a taskmate:// link\n  \
       web-reset <reset-id>     Print the app link for an emailed reset id\n  \
       whoami                   Show the signed-in user\n  \
       refresh                  Refresh the access token\n  \
       logout                   Sign out"
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Some(command) => command,
        None => {
            eprintln!("{}", usage());
            std::process::exit(2);
        }
    };

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({e}), using defaults");
            Config::default()
        }
    };
    // Overrides apply to this run only and are never written back
    let mut effective = config.clone();
    effective.apply_env_overrides();

    let cache_dir = effective
        .cache_dir()
        .unwrap_or_else(|_| PathBuf::from("./cache"));
    let log_guard = init_tracing(&cache_dir);
    info!(api = %effective.api_base_url, "Taskmate CLI starting");

    let api = ApiClient::from_config(&effective).context("Invalid API configuration")?;
    let profile = ProfileStore::new(cache_dir).context("Failed to open profile storage")?;
    let manager = SessionManager::new(api, Arc::new(profile), Arc::new(SecretStore::new()));

    manager.restore_session().await;

    match commands::run(command, &manager, effective.last_email.as_deref()).await {
        Ok(Some(email)) => {
            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            // exit() skips destructors; flush the log writer first
            drop(log_guard);
            std::process::exit(1);
        }
    }
    Ok(())
}
