//! session-cli
//!
//! Command-line front end for the session-aware client:
//! 1. Loads config and the stored session
//! 2. Runs one command (login, request, whoami, logout)
//! 3. Renews an expired access credential transparently
//! 4. On unrecoverable expiry, prints the session-expired notice and exits 2

mod commands;
mod config;
mod error;
mod metrics;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use client::HttpClient;
use session_auth::FileStorage;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Cli;
use crate::config::Config;

/// Exit status when the session has expired and the user must sign in again.
const EXIT_SESSION_EXPIRED: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // JSON logs on stderr so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = Cli::parse(&args).context("invalid arguments")?;

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    debug!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let options = config.client_options()?;

    info!(
        base_url = %options.base_url,
        timeout_secs = config.api.timeout_secs,
        storage = %config.auth.storage_path.display(),
        headers = config.headers.len(),
        "configuration loaded"
    );

    let storage = FileStorage::load(config.auth.storage_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open session file {}",
                config.auth.storage_path.display()
            )
        })?;
    let client = HttpClient::connect(options, Arc::new(storage))
        .await
        .context("failed to start client")?;
    let mut notices = client.subscribe();

    let outcome = commands::run(&client, cli.command).await;

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }

    match outcome {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_session_expired() => {
            match notices.try_recv() {
                Ok(notice) => eprintln!("{notice}"),
                Err(_) => eprintln!(
                    "session expired, please sign in again ({})",
                    client.entry_point()
                ),
            }
            Ok(ExitCode::from(EXIT_SESSION_EXPIRED))
        }
        Err(e) => Err(e).context("command failed"),
    }
}
