mod token_command;


use clap::{Args, Parser, Subcommand};
use gatekeep::transport::{ReqwestTransport, TransportError};
use gatekeep::{
    AuthenticatedFetch, ConfigError, GuardConfig, GuardOutcome, Identity, RequestInit, RouteGuard, Session, Tier,
    safe_redirect,
};
use serde_json::{Value, json};

use crate::token_command::{COMMAND_SUBJECT, CommandTokenSource};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("relative URL {0:?} needs --base-url or GATEKEEP_BASE_URL")]
    MissingBaseUrl(String),
    #[error("invalid header {0:?}; expected 'Name: value'")]
    InvalidHeader(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "gatekeep", about = "Redirect validation, route guard and authenticated fetch tool")]
struct Cli {
    #[arg(long, env = "GATEKEEP_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the post-sign-in target for a candidate location.
    Check(CheckArgs),
    /// Send a request with a bearer token, refreshing once on 401/403.
    Fetch(FetchArgs),
    /// Evaluate the route guard for a location and print the outcome as JSON.
    Guard(GuardArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    candidate: String,

    /// Defaults to GATEKEEP_FALLBACK_PATH, then `/analyze`.
    #[arg(long)]
    fallback: Option<String>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Absolute URL, or a path joined onto --base-url.
    url: String,

    #[arg(long, short = 'X', default_value = "GET")]
    method: String,

    #[arg(long = "header", short = 'H', value_name = "NAME: VALUE")]
    headers: Vec<String>,

    #[arg(long, short = 'd')]
    data: Option<String>,

    /// Shell command whose stdout is the bearer token.
    #[arg(long, env = "GATEKEEP_TOKEN_COMMAND")]
    token_command: String,
}

#[derive(Args, Debug)]
struct GuardArgs {
    location: String,

    #[arg(long, conflicts_with = "resolving")]
    signed_in: bool,

    /// Evaluate as if the provider has not reported yet.
    #[arg(long)]
    resolving: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => run_check(args),
        Command::Fetch(args) => run_fetch(cli.base_url.as_deref(), args).await,
        Command::Guard(args) => run_guard(args),
    }
}

fn run_check(args: CheckArgs) -> Result<(), CliError> {
    let fallback = match args.fallback {
        Some(fallback) => fallback,
        None => GuardConfig::from_env()?.fallback_path,
    };
    println!("{}", safe_redirect(Some(&args.candidate), &fallback));
    Ok(())
}

async fn run_fetch(base_url: Option<&str>, args: FetchArgs) -> Result<(), CliError> {
    let url = resolve_url(base_url, &args.url)?;
    let init = build_init(&args.method, &args.headers, args.data)?;

    let fetch = AuthenticatedFetch::new(CommandTokenSource::new(args.token_command), ReqwestTransport::default());
    let response = fetch.call(&url, init).await?;

    let status = response.status();
    let body = response.text().await?;
    println!("HTTP {}", status.as_u16());
    println!("{body}");

    if !status.is_success() {
        return Err(CliError::Status(status.as_u16()));
    }
    Ok(())
}

fn run_guard(args: GuardArgs) -> Result<(), CliError> {
    let config = GuardConfig::from_env()?;
    let session = if args.resolving {
        Session::Resolving
    } else if args.signed_in {
        Session::Authenticated(Identity {
            subject: COMMAND_SUBJECT.to_owned(),
            display_name: None,
            photo_url: None,
            tier: Tier::Standard,
        })
    } else {
        Session::Unauthenticated
    };

    let outcome = RouteGuard::new(config.sign_in_path).evaluate(&session, &args.location);
    print_json(&guard_report(&outcome))
}

fn resolve_url(base_url: Option<&str>, url: &str) -> Result<String, CliError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(url.to_owned());
    }
    let base = base_url.ok_or_else(|| CliError::MissingBaseUrl(url.to_owned()))?;
    let base = base.trim_end_matches('/');
    if url.starts_with('/') {
        Ok(format!("{base}{url}"))
    } else {
        Ok(format!("{base}/{url}"))
    }
}

fn parse_header(raw: &str) -> Result<(String, String), CliError> {
    let (name, value) = raw.split_once(':').ok_or_else(|| CliError::InvalidHeader(raw.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidHeader(raw.to_owned()));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn build_init(method: &str, headers: &[String], data: Option<String>) -> Result<RequestInit, CliError> {
    let mut init = RequestInit::method(method.to_ascii_uppercase());
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        init = init.header(name, value);
    }
    if let Some(data) = data {
        if !init.headers.contains("Content-Type") && serde_json::from_str::<Value>(&data).is_ok() {
            init = init.header("Content-Type", "application/json");
        }
        init = init.body(data);
    }
    Ok(init)
}

fn guard_report(outcome: &GuardOutcome) -> Value {
    match outcome {
        GuardOutcome::Interim => json!({ "state": "resolving" }),
        GuardOutcome::Render => json!({ "state": "allowed" }),
        GuardOutcome::Redirect(instruction) => json!({
            "state": "denied",
            "redirect": {
                "to": instruction.to,
                "state": instruction.state,
                "replace": instruction.replace,
                "href": instruction.href(),
            },
        }),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
