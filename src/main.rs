//! Dashlink CLI
//!
//! Command-line client for the dashboard messaging session:
//! - Watch folders and print live values
//! - Send a single message
//! - Generate a config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use dashlink::config::{generate_default_config, Config, Discovered, LoggingConfig};
use dashlink::session::Session;
use dashlink::Subscription;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dashlink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live-telemetry dashboard messaging client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe to folders and print incoming messages
    Watch {
        /// Folder paths to subscribe to
        #[arg(required = true)]
        topics: Vec<String>,
        /// Ask the server to echo this client's own messages
        #[arg(long)]
        include_self: bool,
    },

    /// Send one message and exit
    Send {
        /// Message type
        kind: String,
        /// Parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
        /// Destination folder
        #[arg(short, long)]
        target: String,
        /// Give up if no transport opens within this many seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Print a default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            topics,
            include_self,
        } => watch(load_config(cli.config)?, topics, include_self).await,
        Commands::Send {
            kind,
            params,
            target,
            timeout,
        } => {
            let params = params
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--params must be valid JSON")?;
            send(load_config(cli.config)?, &kind, params, &target, timeout).await
        }
        Commands::InitConfig { output } => init_config(output),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let discovered = match path {
        Some(path) => Discovered {
            config: Config::load_with_env(&path)?,
            source: Some(path),
            rejected: Vec::new(),
        },
        None => Config::discover(),
    };

    // Logging settings come from the config, so report how it was found afterwards
    init_tracing(&discovered.config.logging);
    tracing::info!("Dashlink v{}", env!("CARGO_PKG_VERSION"));
    discovered.log();
    Ok(discovered.config)
}

async fn watch(config: Config, topics: Vec<String>, include_self: bool) -> anyhow::Result<()> {
    let session = Session::from_config(&config);

    session.add_sequence_handler(|event| {
        let time = event
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{} {} = {}", time, event.path, event.value);
    });
    session.add_generic_handler(|message| {
        let origin = message
            .topic
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| message.source.to_string());
        println!("[{}] {} {}", origin, message.kind, message.params);
    });

    for topic in topics {
        session.subscribe_with(Subscription::new(topic).include_self(include_self));
    }
    session.connect();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    session.close().await;
    Ok(())
}

async fn send(
    config: Config,
    kind: &str,
    params: Option<Value>,
    target: &str,
    timeout: u64,
) -> anyhow::Result<()> {
    let session = Session::from_config(&config);

    let opened = Arc::new(Notify::new());
    let signal = opened.clone();
    session.connect_with(move || signal.notify_one());

    let result = tokio::time::timeout(Duration::from_secs(timeout), opened.notified()).await;
    if result.is_ok() {
        let delivered = session.send(kind, params, Some(target));
        println!("Sent {} to {} over {} transport(s)", kind, target, delivered);
    }

    session.close().await;
    result.context("no transport opened in time")
}

fn init_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("writing config to {}", path.display()))?;
            println!("Config written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dashlink={}", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
