//! Tutor session command-line client
//!
//! Single binary that:
//! 1. Loads configuration and the saved credential
//! 2. Restores the session (refreshing the token if needed)
//! 3. Runs one command: login, signup, logout, status, or an authenticated call
//! 4. Prints the result as JSON on stdout; logs go to stderr

mod command;
mod config;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use common::Secret;
use serde_json::{Value, json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutor_api::{ChatRequest, TutorApi};
use tutor_auth::{CredentialStore, SignupRequest};
use tutor_session::{SessionClient, SessionState, SignupOutcome};

use crate::command::{Command, Invocation, SignupArgs};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = Invocation::parse(&args)?;

    let (config_path, explicit) = Config::resolve_path(invocation.config.as_deref());
    let config = if explicit || config_path.exists() {
        debug!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::from_env().context("invalid configuration")?
    };

    info!(
        base_url = %config.api.base_url,
        credential_path = %config.session.credential_path.display(),
        profile = %config.session.profile,
        "configuration loaded"
    );

    let store = CredentialStore::load(
        config.session.credential_path.clone(),
        config.session.profile.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "failed to open credential store {}",
            config.session.credential_path.display()
        )
    })?;
    let client = SessionClient::new(config.client_config(), Arc::new(store))
        .context("failed to create HTTP client")?;

    let output = run(invocation.command, &client, config.password.clone()).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize tracing on stderr with LOG_LEVEL / RUST_LOG support.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Execute one command and return what to print.
async fn run(
    command: Command,
    client: &SessionClient,
    password: Option<Secret<String>>,
) -> Result<Value> {
    let api = TutorApi::new(client.clone());
    match command {
        Command::Login { email } => {
            let password = resolve_password(password)?;
            let user = client
                .login(&email, password.expose())
                .await
                .context("login failed")?;
            Ok(json!({ "status": "authenticated", "user": user.as_ref() }))
        }
        Command::Signup(args) => {
            let password = resolve_password(password)?;
            let request = signup_request(args, &password);
            match client.signup(&request).await.context("signup failed")? {
                SignupOutcome::Authenticated(user) => {
                    Ok(json!({ "status": "authenticated", "user": user.as_ref() }))
                }
                SignupOutcome::LoginRequired { account } => {
                    Ok(json!({ "status": "login_required", "account": account }))
                }
            }
        }
        Command::Logout => {
            client.logout().await.context("logout failed")?;
            Ok(render_state(&client.current()))
        }
        Command::Status => Ok(render_state(&client.restore().await)),
        Command::Get { path } => {
            restore_or_bail(client).await?;
            client
                .get_json(&path)
                .await
                .with_context(|| format!("GET {path} failed"))
        }
        Command::Documents => {
            restore_or_bail(client).await?;
            api.documents().await.context("listing documents failed")
        }
        Command::Progress => {
            restore_or_bail(client).await?;
            api.progress_overview()
                .await
                .context("fetching progress failed")
        }
        Command::Chat { message } => {
            restore_or_bail(client).await?;
            api.chat(&ChatRequest::new(message))
                .await
                .context("chat failed")
        }
    }
}

async fn restore_or_bail(client: &SessionClient) -> Result<()> {
    if !client.restore().await.is_authenticated() {
        anyhow::bail!("not logged in; run `tutor-session login <email>` first");
    }
    Ok(())
}

fn render_state(state: &SessionState) -> Value {
    match state.user() {
        Some(user) => json!({
            "status": state.status().as_str(),
            "user": user,
            "display_name": user.display_name(),
        }),
        None => json!({ "status": state.status().as_str() }),
    }
}

/// Password from TUTOR_PASSWORD, else the first line of stdin.
fn resolve_password(from_env: Option<Secret<String>>) -> Result<Secret<String>> {
    if let Some(password) = from_env {
        return Ok(password);
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("no password given; set TUTOR_PASSWORD or pipe it on stdin");
    }
    Ok(Secret::new(password))
}

fn signup_request(args: SignupArgs, password: &Secret<String>) -> SignupRequest {
    let mut request = SignupRequest::new(args.email, password.expose().clone());
    request.first_name = args.first_name;
    request.last_name = args.last_name;
    request.grade_level = args.grade_level;
    request.subjects = args.subjects;
    request.tenant_code = args.tenant_code;
    request
}
