//! The `convoy` binary: start the gateway or inspect a running one.

use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    convoy_channels::SenderRegistry,
    convoy_gateway::services::{NoopAgentService, NoopEmbeddingService},
};

#[derive(Parser)]
#[command(name = "convoy", about = "Convoy — conversational message gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Explicit config file path (overrides discovery).
    #[arg(long, global = true, env = "CONVOY_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve,
    /// Fetch queue statistics from a running gateway.
    Queues {
        /// Base URL of the gateway.
        #[arg(long, default_value = "http://127.0.0.1:8790")]
        url: String,
    },
}

fn init_tracing(log_level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match &cli.command {
        None | Some(Commands::Serve) => serve(&cli).await,
        Some(Commands::Queues { url }) => queues(url).await,
    }
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match cli.config {
        Some(ref path) => convoy_config::load_config(path)?,
        None => convoy_config::discover_and_load(),
    };
    if let Some(ref bind) = cli.bind {
        config.gateway.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    info!(
        bind = %config.gateway.bind,
        port = config.gateway.port,
        channels = config.channels.len(),
        "starting convoy gateway"
    );

    // Outbound senders come from deployment credentials; the default build
    // starts with an empty registry and the Noop collaborators so the
    // gateway is immediately runnable.
    convoy_gateway::server::start_gateway(
        config,
        Arc::new(NoopAgentService),
        Arc::new(NoopEmbeddingService),
        Arc::new(SenderRegistry::new()),
    )
    .await
}

async fn queues(url: &str) -> anyhow::Result<()> {
    let body: serde_json::Value = reqwest::get(format!("{url}/api/queues"))
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
