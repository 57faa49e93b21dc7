//! `TaskDesk`: command-line client for the task dashboard API.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskdesk/config.toml`).
//!
//! ```bash
//! # Everything visible to you
//! cargo run --bin taskdesk -- --api-url http://127.0.0.1:8080/api list
//!
//! # Tasks assigned to you that are still pending
//! TASKDESK_API_URL=http://127.0.0.1:8080/api cargo run -- list mine status=pending
//!
//! # Mark a task done
//! cargo run -- --api-url http://127.0.0.1:8080/api status t1 completed
//! ```

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskdesk::api::http::HttpTaskApi;
use taskdesk::cache::TaskCache;
use taskdesk::cli;
use taskdesk::config::{CliArgs, ClientConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file; stdout is reserved for command output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let Some(api_config) = config.to_api_config() else {
        eprintln!("error: no API URL configured (use --api-url, TASKDESK_API_URL or [api] base_url)");
        return ExitCode::from(2);
    };
    let api = match HttpTaskApi::new(&api_config) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    tracing::info!(api = %api.base_url(), "taskdesk starting");
    let cache = TaskCache::with_config(api, &config.cache);
    let command = cli.command.unwrap_or_default();

    let mut stdout = io::stdout().lock();
    let result = cli::run(&cache, command, &mut stdout).await;
    let _ = stdout.flush();

    match result {
        Ok(()) => {
            tracing::info!("taskdesk exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            eprintln!("error: {}", e.user_message());
            if e.requires_login() {
                eprintln!("hint: pass a fresh token with --token or TASKDESK_TOKEN");
            } else if e.is_retryable() {
                eprintln!("hint: the failure looks temporary, run the command again");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskdesk.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
