//! hostwatch-provider - serve host telemetry on stdin/stdout
//!
//! Usage:
//! - `hostwatch-provider` - serve JSON-RPC until stdin closes
//! - `hostwatch-provider test` - print one snapshot and exit

use anyhow::Result;
use clap::{Parser, Subcommand};
use hostwatch_provider::{default_tools, Endpoint};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hostwatch-provider")]
#[command(about = "Host telemetry provider speaking JSON-RPC over stdio")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect one snapshot, print it as JSON and exit
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout belongs to the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match cli.command {
        Some(Commands::Test) => {
            let payload = match tokio::task::spawn_blocking(hostwatch_provider::collect).await? {
                Ok(snapshot) => serde_json::to_value(snapshot)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        None => {
            info!(pid = std::process::id(), "Starting hostwatch provider");
            Endpoint::new(default_tools())
                .serve(tokio::io::stdin(), tokio::io::stdout())
                .await?;
        }
    }

    Ok(())
}
