//! School admin CLI
//!
//! Thin front end over `api-client`:
//! 1. Loads configuration and the persisted session
//! 2. Runs one command (login, logout, status, request)
//! 3. Every backend call goes through `ApiClient`, so an expired access
//!    token is refreshed transparently and a dead session is reported once

mod cli;
mod config;
mod error;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api_client::{ApiClient, ApiRequest, SessionEvent};
use session_auth::{CredentialStore, FilePersistence};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::USAGE;

const RELOGIN_HINT: &str = "session ended; run `school-admin login` to sign in again";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse(std::env::args().skip(1)).map_err(|e| anyhow::anyhow!("{e}\n{USAGE}"))?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let output = execute(cli.command, &config).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Build the client from config: persisted session plus HTTP timeout.
async fn build_client(config: &Config) -> Result<ApiClient> {
    let persistence = FilePersistence::new(config.session.credentials_file.clone());
    let store = CredentialStore::load(Arc::new(persistence))
        .await
        .with_context(|| {
            format!(
                "failed to load session from {}",
                config.session.credentials_file.display()
            )
        })?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    info!(base_url = %config.api.base_url, "client ready");
    Ok(ApiClient::new(http, config.api.base_url.clone(), Arc::new(store)))
}

/// Run one command and return what to print on stdout.
async fn execute(command: Command, config: &Config) -> Result<String> {
    let client = build_client(config).await?;

    match command {
        Command::Login => {
            let email = config
                .session
                .email
                .as_deref()
                .context("session.email is not configured")?;
            let password = config.session.password.as_ref().with_context(|| {
                format!(
                    "no password: set {} or session.password_file",
                    config::PASSWORD_ENV
                )
            })?;
            client
                .login(email, password.expose())
                .await
                .context("login failed")?;
            Ok(format!("signed in as {email}"))
        }
        Command::Logout => {
            client.logout().await;
            Ok("signed out".into())
        }
        Command::Status => {
            let credentials = client.session().store().get().await;
            Ok(if credentials.authenticated {
                "signed in".into()
            } else {
                "not signed in".into()
            })
        }
        Command::Request { method, path, body } => {
            let mut events = client.session().subscribe();
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.json(body);
            }

            let result = client.send(request).await;
            if let Some(reason) = session_ended(&mut events) {
                eprintln!("{RELOGIN_HINT} ({reason})");
            }

            let response = result.context("request failed")?;
            Ok(render_body(&response.body))
        }
    }
}

/// Reason of the session-ended event raised during the command, if any.
fn session_ended(events: &mut broadcast::Receiver<SessionEvent>) -> Option<String> {
    match events.try_recv() {
        Ok(SessionEvent::Ended { reason }) => Some(reason),
        Err(_) => None,
    }
}

/// Pretty-print JSON bodies; anything else is shown as text.
fn render_body(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}
