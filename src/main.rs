use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde_json::Value;

use deeprest::auth::{Token, TokenStore};
use deeprest::config::Config;
use deeprest::coordinator::Coordinator;
use deeprest::faram::FaramErrors;
use deeprest::logging::init_tracing;
use deeprest::request::{PollPolicy, RequestState};
use deeprest::transport::HttpTransport;
use deeprest::update::update_json;

/// Retrying, polling REST client and JSON patch tool.
#[derive(Debug, Parser)]
#[command(name = "deeprest", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// GET a url through the request engine and print the JSON response
    Get(GetArgs),

    /// Apply a `$`-keyed patch spec to a JSON document
    Patch(PatchArgs),
}

#[derive(Debug, clap::Args)]
struct GetArgs {
    /// Absolute url, or a path relative to the configured endpoint
    url: String,

    /// Config file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer token sent with the request
    #[arg(long, env = "DEEPREST_TOKEN")]
    token: Option<String>,

    /// Keep polling until this JSON pointer resolves to a truthy value
    #[arg(long)]
    until: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Maximum number of polls
    #[arg(long)]
    max_polls: Option<u32>,
}

#[derive(Debug, clap::Args)]
struct PatchArgs {
    /// JSON document to update
    value: PathBuf,

    /// Patch spec
    spec: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Get(args) => run_get(args).await,
        Command::Patch(args) => run_patch(args),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

fn run_patch(args: PatchArgs) -> anyhow::Result<()> {
    let value = read_json(&args.value)?;
    let spec = read_json(&args.spec)?;
    let updated = update_json(&value, &spec)?;
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Outcome reported by the request callbacks.
enum Outcome {
    Body(Value),
    Failed(String),
    Fatal(String),
}

async fn run_get(args: GetArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let transport = HttpTransport::from_config(&config)?;
    let tokens = Arc::new(TokenStore::new(Token {
        access: args.token.clone(),
        refresh: None,
    }));
    let coordinator = Coordinator::from_config(&config, tokens, Arc::new(transport));

    let outcome = Arc::new(Mutex::new(None::<Outcome>));
    let mut builder = coordinator.builder(args.url.clone()).retry_policy(config.retry_policy());

    if let Some(pointer) = args.until.clone() {
        let defaults = config.poll_policy();
        builder = builder
            .poll_policy(PollPolicy::new(
                args.poll_ms.map(Duration::from_millis).unwrap_or(defaults.poll_time),
                args.max_polls.unwrap_or(defaults.max_poll_attempts),
            ))
            .should_poll(move |body| !is_truthy(body.pointer(&pointer)))
            .on_poll(|_| tracing::info!("Condition not met yet, polling"));
    }

    let (on_success, on_failure, on_fatal) = (outcome.clone(), outcome.clone(), outcome.clone());
    let request = builder
        .success(move |body| *on_success.lock() = Some(Outcome::Body(body.clone())))
        .failure(move |response| {
            let message = FaramErrors::from_response(&response.body).message_for_notification();
            *on_failure.lock() = Some(Outcome::Failed(format!("{} ({})", message, response.status)));
        })
        .fatal(move |error| *on_fatal.lock() = Some(Outcome::Fatal(error.to_string())))
        .build()?;

    request.start();
    let state = request.wait().await;

    let taken = outcome.lock().take();
    match taken {
        Some(Outcome::Body(body)) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Some(Outcome::Failed(message)) => bail!("Request failed: {}", message),
        Some(Outcome::Fatal(message)) => bail!("Request fatal: {}", message),
        None if state == RequestState::Invalid => bail!("Response failed validation"),
        None => bail!("Request ended in state {}", state),
    }
}
