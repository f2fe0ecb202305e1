//! hostwatch - ask a chat model about this machine
//!
//! Subcommands:
//! - `hostwatch chat` - interactive chat; the model can read live host metrics
//! - `hostwatch watch` - print a telemetry snapshot on every poll
//! - `hostwatch probe` - fetch one snapshot and print it
//! - `hostwatch tools` - list the provider's tools as function schemas
//! - `hostwatch config` - show the effective configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hostwatch_bridge::{
    initial_snapshot, telemetry, ChatSession, OpenAiProvider, ProviderClient, SamplingParams,
    SubscriberRegistry, TelemetryPoller,
};
use hostwatch_conf::HostwatchConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(about = "Chat with a model that can read live host telemetry")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./hostwatch.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// OTLP gRPC endpoint for traces and logs (e.g., 127.0.0.1:4317)
    #[arg(long, global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat on stdin/stdout
    Chat,

    /// Print each telemetry push as one JSON line
    Watch {
        /// Stop after this many snapshots
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Fetch one telemetry snapshot
    Probe,

    /// List the provider's tools as function-calling schemas
    Tools,

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = HostwatchConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(endpoint) = cli.otlp_endpoint {
        config.telemetry.otlp_endpoint = Some(endpoint);
    }

    let _telemetry = telemetry::init(
        &config.telemetry.log_level,
        config.telemetry.otlp_endpoint.as_deref(),
    )?;

    if let Commands::Config = cli.command {
        for file in &sources.files {
            println!("# file: {}", file.display());
        }
        for var in &sources.env_overrides {
            println!("# env: {}", var);
        }
        print!("{}", config.to_redacted_toml());
        return Ok(());
    }

    let client = Arc::new(ProviderClient::from_config(&config.provider));
    client
        .start()
        .await
        .with_context(|| format!("Failed to start provider `{}`", config.provider.program))?;

    let outcome = match cli.command {
        Commands::Chat => chat(client.clone(), &config).await,
        Commands::Watch { count } => watch(client.clone(), &config, count).await,
        Commands::Probe => probe(&client).await,
        Commands::Tools => tools(&client),
        Commands::Config => Ok(()),
    };

    client.close().await;
    outcome
}

async fn chat(client: Arc<ProviderClient>, config: &HostwatchConfig) -> Result<()> {
    if config.model.api_key.is_none() {
        warn!("No API key configured; set GROQ_API_KEY or HOSTWATCH_API_KEY");
    }

    let model = Arc::new(OpenAiProvider::from_config(&config.model));
    let mut session =
        ChatSession::new(client, model).with_params(SamplingParams::from(&config.model));
    info!(session = %session.id(), "Chat session started");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"Ask about this machine. /reset clears the conversation, /quit exits.\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                stdout.write_all(b"(conversation cleared)\n").await?;
            }
            message => {
                let reply = session.chat(message).await;
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n\n").await?;
            }
        }
    }

    Ok(())
}

async fn watch(
    client: Arc<ProviderClient>,
    config: &HostwatchConfig,
    count: Option<usize>,
) -> Result<()> {
    let subscribers = Arc::new(SubscriberRegistry::new());
    let (id, mut rx) = subscribers.connect();

    let mut printed = 0;
    match initial_snapshot(&client).await {
        Ok(message) => {
            println!("{}", serde_json::to_string(&message)?);
            printed += 1;
        }
        Err(e) => warn!(error = %e, "Error sending initial data"),
    }

    let poller =
        TelemetryPoller::with_config(client, subscribers.clone(), &config.poller).spawn();

    while count.map_or(true, |n| printed < n) {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else { break };
                println!("{}", serde_json::to_string(&message)?);
                printed += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    subscribers.disconnect(id);
    poller.abort();
    Ok(())
}

async fn probe(client: &ProviderClient) -> Result<()> {
    let snapshot = client
        .fetch_telemetry()
        .await
        .context("Failed to fetch telemetry")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn tools(client: &ProviderClient) -> Result<()> {
    let registry = client.registry();
    println!("{}", serde_json::to_string_pretty(registry.schemas())?);
    Ok(())
}
