use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt as _;
use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing_subscriber::EnvFilter;
use wifassist_auth::{CredentialBroker, CredentialCheck, interactive_login};
use wifassist_config::Config;
use wifassist_store::InMemoryCredentialStore;
use wifassist_stream::StreamingAggregator;
use wifassist_types::{
    AssistEvent, BearerToken, FinalAnswer, StreamAssistRequest, ToolDeclaration,
};

#[derive(Parser, Debug)]
#[command(
    name = "wifassist",
    about = "wifassist — federated Entra ID login for StreamAssist"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Credential scope: application name (overrides `app_name`).
    #[arg(long, global = true)]
    app: Option<String>,
    /// Credential scope: user id (overrides `user_id`).
    #[arg(long, global = true)]
    user: Option<String>,
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in through the browser and exchange the result for a federated credential.
    Login,
    /// Ask the assistant one question, logging in first if needed.
    Ask {
        /// Question text.
        query: String,
        /// Declare a tool the assistant may call: `name:param,param[:description]`.
        #[arg(long = "tool", value_name = "SPEC")]
        tools: Vec<ToolDeclaration>,
    },
    /// Read questions from stdin and keep one conversation going (`/reset` starts over).
    Chat {
        #[arg(long = "tool", value_name = "SPEC")]
        tools: Vec<ToolDeclaration>,
    },
    /// Show configuration and credential state.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(app) = cli.app {
        config.app_name = app;
    }
    if let Some(user) = cli.user {
        config.user_id = user;
    }

    match cli.command {
        Commands::Login => cmd_login(&config).await,
        Commands::Ask { query, tools } => cmd_ask(&config, &query, &tools).await,
        Commands::Chat { tools } => cmd_chat(&config, &tools).await,
        Commands::Status => cmd_status(&config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).map_err(|e| anyhow::anyhow!("config error: {e}"))
}

fn broker(config: &Config) -> Result<CredentialBroker> {
    let store = Arc::new(InMemoryCredentialStore::new());
    CredentialBroker::from_config(config, store).context("cannot set up login")
}

/// Cached bearer for the configured scope, logging in when there is none.
async fn ensure_credential(broker: &CredentialBroker, config: &Config) -> Result<BearerToken> {
    let (app, user) = (&config.app_name, &config.user_id);
    let mut request = StreamAssistRequest::default();
    if let CredentialCheck::AuthRequired(signal) = broker.authorize(app, user, &mut request).await?
    {
        eprintln!(
            "Authentication required ({} scopes: {})",
            signal.descriptor.credential_key,
            signal.descriptor.scope_string()
        );
        interactive_login(broker, app, user, &config.callback)
            .await
            .context("login failed")?;
        broker.authorize(app, user, &mut request).await?;
    }
    request
        .credential
        .context("federated credential has no access token")
}

async fn cmd_login(config: &Config) -> Result<()> {
    let broker = broker(config)?;
    let credential = interactive_login(
        &broker,
        &config.app_name,
        &config.user_id,
        &config.callback,
    )
    .await
    .context("login failed")?;
    println!("audience:   {}", credential.audience);
    if let Some(expires_at) = credential.bearer.as_ref().and_then(|b| b.expires_at) {
        println!("expires_at: {expires_at}");
    }
    Ok(())
}

async fn cmd_ask(config: &Config, query: &str, tools: &[ToolDeclaration]) -> Result<()> {
    config.validate()?;
    let broker = broker(config)?;
    let aggregator = StreamingAggregator::from_config(&config.assistant)?;
    let credential = ensure_credential(&broker, config).await?;
    run_turn(&aggregator, query, tools, credential).await
}

async fn cmd_chat(config: &Config, tools: &[ToolDeclaration]) -> Result<()> {
    config.validate()?;
    let broker = broker(config)?;
    let aggregator = StreamingAggregator::from_config(&config.assistant)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/reset" => {
                aggregator.reset_session();
                eprintln!("(new conversation)");
            }
            "/quit" | "/exit" => break,
            query => {
                let credential = ensure_credential(&broker, config).await?;
                if let Err(e) = run_turn(&aggregator, query, tools, credential).await {
                    tracing::error!(error = %e, "turn failed");
                    eprintln!("error: {e:#}");
                }
            }
        }
        eprint!("> ");
    }
    Ok(())
}

/// Print partial text as it arrives, then the final answer or tool call.
async fn run_turn(
    aggregator: &StreamingAggregator,
    query: &str,
    tools: &[ToolDeclaration],
    credential: BearerToken,
) -> Result<()> {
    let mut events = aggregator.invoke(query, tools, Some(credential)).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event? {
            AssistEvent::Partial(text) => write!(stdout, "{text}")?,
            AssistEvent::Final(FinalAnswer::Text(_)) => writeln!(stdout)?,
            AssistEvent::Final(FinalAnswer::ToolCall(call)) => {
                writeln!(stdout, "\n\ntool call: {}", call.name)?;
                writeln!(
                    stdout,
                    "{}",
                    serde_json::to_string_pretty(&call.parameters)?
                )?;
            }
        }
        stdout.flush()?;
    }
    if let Some(session) = aggregator.session().id() {
        tracing::debug!(%session, "conversation continues");
    }
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    println!("app / user:     {} / {}", config.app_name, config.user_id);
    let fed = &config.federation;
    println!("tenant:         {}", fed.tenant_id.as_deref().unwrap_or("-"));
    println!("client id:      {}", fed.client_id.as_deref().unwrap_or("-"));
    println!(
        "workforce pool: {} / {}",
        fed.pool_id.as_deref().unwrap_or("-"),
        fed.provider_id.as_deref().unwrap_or("-")
    );
    println!("redirect uri:   {}", config.callback.redirect_uri());
    match config.assistant.resource_name() {
        Ok(resource) => println!("assistant:      {resource}"),
        Err(_) => println!("assistant:      -"),
    }

    if let Err(e) = config.validate() {
        println!("config:         {e}");
        return Ok(());
    }
    match broker(config) {
        Ok(broker) => {
            println!("audience:       {}", broker.target().audience());
            println!("scopes:         {}", broker.descriptor().scope_string());
            let state = match broker.check(&config.app_name, &config.user_id).await? {
                CredentialCheck::Ready(_) => "ready".to_string(),
                CredentialCheck::AuthRequired(_) => {
                    broker.state(&config.app_name, &config.user_id).to_string()
                }
            };
            println!("credential:     {state}");
        }
        Err(e) => println!("credential:     {e:#}"),
    }
    Ok(())
}
