//! forwardkey - command-line client for the openai-forward management API.
//!
//! Signs in through the proxy's OIDC flow, keeps the issued API key in the
//! local session store, and lists the Azure and OpenAI models the proxy
//! exposes.

mod callback;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use forwardkey_core::bootstrap::authorization_code;
use forwardkey_core::{
    bootstrap, ApiClient, Boot, ClientConfig, ClientError, SessionStore, StorageKind,
    SystemBrowser,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Default local port for the login redirect
const DEFAULT_CALLBACK_PORT: u16 = 8976;

/// When set, logs are also written to a daily file in this directory
const LOG_DIR_ENV: &str = "FORWARDKEY_LOG_DIR";

const LOG_FILE_PREFIX: &str = "forwardkey.log";

/// Characters of the token shown by `status` unless `--reveal` is given
const TOKEN_PREVIEW_CHARS: usize = 6;

#[derive(Parser)]
#[command(name = "forwardkey", version, about = "Client for the openai-forward management API")]
struct Cli {
    /// API base address (absolute, or relative to --origin)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Origin the proxy serves its web root from
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Session storage backend: file, keyring or memory
    #[arg(long, global = true)]
    storage: Option<StorageKind>,

    /// Forget the stored token when the backend answers 401
    #[arg(long = "clear-on-401", global = true)]
    clear_on_401: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in through the browser and store the issued key
    Login {
        #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
        port: u16,
    },
    /// Finish a login from a redirect URL (or a bare authorization code)
    Callback { location: String },
    /// Show the stored session
    Status {
        /// Print the full token
        #[arg(long)]
        reveal: bool,
    },
    /// List models available through the proxy
    Models {
        #[arg(value_enum, default_value = "all")]
        provider: Provider,
    },
    /// Remove the stored session
    Logout,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Azure,
    Openai,
    All,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(ref e) = result {
        if e.downcast_ref::<ClientError>().is_some_and(ClientError::is_auth) {
            eprintln!("Session rejected by the server. Run `forwardkey login` to sign in again.");
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load()?;
    if let Some(endpoint) = cli.endpoint {
        config.api_endpoint = endpoint;
    }
    if let Some(origin) = cli.origin {
        config.origin = origin;
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    if cli.clear_on_401 {
        config.clear_session_on_unauthorized = true;
    }

    let session = Arc::new(SessionStore::open(&config)?);
    let client = ApiClient::new(&config, session.clone(), Arc::new(SystemBrowser))?;

    match cli.command {
        Command::Login { port } => login(&client, port).await,
        Command::Callback { location } => finish_login(&client, &location).await,
        Command::Status { reveal } => {
            print_status(&client, reveal);
            Ok(())
        }
        Command::Models { provider } => list_models(&client, provider).await,
        Command::Logout => {
            session.clear();
            eprintln!("Signed out.");
            Ok(())
        }
    }
}

async fn login(client: &ApiClient, port: u16) -> Result<()> {
    let listener = callback::bind(port).await?;
    let here = format!("http://127.0.0.1:{port}/");

    let url = client.begin_auth(&here);
    eprintln!("Waiting for sign-in. If no browser opened, visit:\n  {url}");

    let target = callback::accept(listener).await?;
    let location = format!("http://127.0.0.1:{port}{target}");
    match bootstrap(client, &location).await? {
        Boot::Authenticated => {
            eprintln!("Signed in.");
            Ok(())
        }
        Boot::Idle => Err(anyhow::anyhow!(
            "Redirect carried no authorization code: {target}"
        )),
    }
}

async fn finish_login(client: &ApiClient, input: &str) -> Result<()> {
    match classify_callback_input(input)? {
        CallbackInput::Location(location) => {
            bootstrap(client, location).await?;
        }
        CallbackInput::Code(code) => client.complete_auth(code).await?,
    }
    eprintln!("Signed in.");
    Ok(())
}

/// What the user handed to `forwardkey callback`.
#[derive(Debug, PartialEq, Eq)]
enum CallbackInput<'a> {
    /// A redirect URL or path carrying `code`
    Location(&'a str),
    /// The authorization code itself
    Code(&'a str),
}

/// Anything that looks like a URL or a path must carry a `code` parameter;
/// only other input is taken as a bare code.
fn classify_callback_input(input: &str) -> Result<CallbackInput<'_>> {
    let input = input.trim();
    if authorization_code(input).is_some() {
        return Ok(CallbackInput::Location(input));
    }
    let looks_like_location =
        input.contains("://") || input.starts_with('/') || input.starts_with('?');
    if looks_like_location || input.is_empty() {
        anyhow::bail!("No authorization code in {input:?}");
    }
    Ok(CallbackInput::Code(input))
}

fn print_status(client: &ApiClient, reveal: bool) {
    let info = client.current_session();
    println!("state:   {:?}", client.session().state());

    match info.token {
        Some(ref token) if reveal => println!("token:   {}", token),
        Some(ref token) => println!("token:   {}", preview(token)),
        None => println!("token:   (none)"),
    }

    match info.token_expires_at {
        Some(ref expires_at) => match describe_expiry(expires_at, Utc::now()) {
            Some(relative) => println!("expires: {} ({})", expires_at, relative),
            None => println!("expires: {}", expires_at),
        },
        None => println!("expires: (unknown)"),
    }
}

async fn list_models(client: &ApiClient, provider: Provider) -> Result<()> {
    let output = match provider {
        Provider::Azure => client.list_azure_models().await?,
        Provider::Openai => client.list_openai_models().await?,
        Provider::All => {
            let (azure, openai) = futures::future::try_join(
                client.list_azure_models(),
                client.list_openai_models(),
            )
            .await?;
            serde_json::json!({ "azure": azure, "openai": openai })
        }
    };
    info!("Model listing received");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn preview(token: &str) -> String {
    let shown: String = token.chars().take(TOKEN_PREVIEW_CHARS).collect();
    if shown.len() < token.len() {
        format!("{}...", shown)
    } else {
        shown
    }
}

/// Human-readable distance to an RFC 3339 expiry. Display only; the token
/// is sent regardless.
fn describe_expiry(expires_at: &str, now: DateTime<Utc>) -> Option<String> {
    let expiry = DateTime::parse_from_rfc3339(expires_at).ok()?.with_timezone(&Utc);
    let delta = expiry - now;
    let minutes = delta.num_minutes().abs();
    let span = if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 1440 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}d {}h", minutes / 1440, (minutes % 1440) / 60)
    };
    if delta.num_seconds() >= 0 {
        Some(format!("in {}", span))
    } else {
        Some(format!("{} ago", span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_preview_masks_long_tokens() {
        assert_eq!(preview("sk-abcdef123456"), "sk-abc...");
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_describe_expiry_future_and_past() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            describe_expiry("2025-01-01T02:30:00Z", now).as_deref(),
            Some("in 2h 30m")
        );
        assert_eq!(
            describe_expiry("2024-12-29T00:00:00Z", now).as_deref(),
            Some("3d 0h ago")
        );
        assert_eq!(describe_expiry("2025-01-01T00:05:00+00:00", now).as_deref(), Some("in 5m"));
    }

    #[test]
    fn test_describe_expiry_unparseable() {
        assert_eq!(describe_expiry("next tuesday", Utc::now()), None);
    }

    #[test]
    fn test_callback_input_with_code_is_a_location() {
        assert_eq!(
            classify_callback_input(" http://127.0.0.1:8976/?code=abc ").unwrap(),
            CallbackInput::Location("http://127.0.0.1:8976/?code=abc")
        );
        assert_eq!(
            classify_callback_input("/?state=x&code=abc").unwrap(),
            CallbackInput::Location("/?state=x&code=abc")
        );
    }

    #[test]
    fn test_callback_input_bare_code() {
        assert_eq!(
            classify_callback_input("abc123\n").unwrap(),
            CallbackInput::Code("abc123")
        );
    }

    #[test]
    fn test_callback_input_url_without_code_is_rejected() {
        for input in ["http://127.0.0.1:8976/?state=x", "/?state=x", "?state=x", "  "] {
            let err = classify_callback_input(input).unwrap_err();
            assert!(err.to_string().starts_with("No authorization code"), "{input}");
        }
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "forwardkey",
            "models",
            "azure",
            "--storage",
            "memory",
            "--clear-on-401",
        ])
        .expect("valid arguments");
        assert!(cli.clear_on_401);
        assert_eq!(cli.storage, Some(StorageKind::Memory));
        assert!(matches!(
            cli.command,
            Command::Models {
                provider: Provider::Azure
            }
        ));
    }
}
