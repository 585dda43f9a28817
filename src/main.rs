//! # HubWatch: rate-limit aware GitHub repository watcher
//!
//! Usage:
//!   hubwatch init                                  # Write a default config
//!   hubwatch run                                   # Poll all subscriptions, read commands from stdin
//!   hubwatch run --config ./hubwatch.toml -v       # Custom config, debug logging
//!   hubwatch exec issues add rust-lang/rust 123    # Run one command against the stored state

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hubwatch_core::HubWatchConfig;
use hubwatch_github::{GitHubClient, RateGate, RateStatus};
use hubwatch_scheduler::{Command, Hub};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hubwatch",
    version,
    about = "👀 HubWatch: GitHub repository feeds, delivered to your chats"
)]
struct Cli {
    /// Config file (default: ~/.hubwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config to ~/.hubwatch/config.toml
    Init,
    /// Start every poll loop and accept commands on stdin until Ctrl-C or EOF
    Run,
    /// Run a single command, e.g. `issues add owner/repo 123 card`
    Exec {
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<HubWatchConfig> {
    let config = match path {
        Some(path) => HubWatchConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HubWatchConfig::load()?,
    };
    Ok(config)
}

fn rate_notice(status: &RateStatus, class: &str) {
    tracing::debug!(
        "📊 GitHub {class}: {}/{} left, reset at {}",
        status.remaining,
        status.limit,
        status.reset
    );
    if status.remaining == 0 {
        tracing::warn!(
            "⏳ GitHub {class} quota exhausted, polling pauses for {}s",
            status.wait_secs(chrono::Utc::now().timestamp())
        );
    }
}

fn build_hub(config: &HubWatchConfig) -> Result<Hub> {
    let gate = Arc::new(RateGate::new().with_notice(rate_notice));
    let client = GitHubClient::new(&config.github, gate)?;
    let transport = hubwatch_channels::transport_from_config(&config.transport)?;
    tracing::info!(
        "🔌 Transport: {} | Store: {:?} at {}",
        transport.name(),
        config.scheduler.store,
        config.scheduler.data_path().display()
    );
    Ok(Hub::from_config(config, Arc::new(client), transport)?)
}

async fn handle_line(hub: &Hub, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    let result = match line.parse::<Command>() {
        Ok(command) => hub.execute(command).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(reply) => println!("{reply}"),
        Err(e) => eprintln!("❌ {e}"),
    }
}

async fn run(config: HubWatchConfig) -> Result<()> {
    let hub = build_hub(&config)?;
    if config.github.resolved_token().is_none() {
        tracing::warn!("⚠️ No GitHub token configured; unauthenticated quota is 60 requests/hour");
    }
    hub.start();
    println!("👀 HubWatch running. Type commands, Ctrl-C or EOF to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Ctrl-C received, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&hub, &line).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("⚠️ stdin closed: {e}");
                    break;
                }
            },
        }
    }

    hub.stop().await;
    println!("👋 Stopped.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "hubwatch=debug" } else { "hubwatch=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => {
            let path = HubWatchConfig::default_path();
            if path.exists() {
                println!("⚠️  Config already exists at {}", path.display());
            } else {
                HubWatchConfig::default().save()?;
                println!("✅ Wrote default config to {}", path.display());
            }
        }
        Commands::Run => run(load_config(cli.config.as_ref())?).await?,
        Commands::Exec { args } => {
            let config = load_config(cli.config.as_ref())?;
            let command: Command = args.join(" ").parse()?;
            let hub = build_hub(&config)?;
            println!("{}", hub.execute(command).await?);
        }
    }
    Ok(())
}
