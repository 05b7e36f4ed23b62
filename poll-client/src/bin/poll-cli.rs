//! Read-only command line access to the poll contracts.
//!
//! Configuration comes from flags or the environment (see `ClientConfig`);
//! results are printed as JSON on stdout, logs go to stderr.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use poll_client::config::{ClientConfig, ConfigError};
use poll_client::gasless::{GaslessDelegate, PlaceholderSigner};
use poll_client::{PollError, PollService};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "poll-cli", author, version, about)]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Affordances of the configured contract variant
    Features,
    /// Polls of the configured contract, lowest id first
    Polls {
        /// Highest poll id listed; defaults to the scan limit
        #[arg(long)]
        limit: Option<usize>,
    },
    /// One poll by id
    Poll { id: u64 },
    /// Whether the gasless relayer accepts votes
    RelayerHealth,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("cannot print the result: {0}")]
    Output(#[from] serde_json::Error),
}

fn init_tracing(config: &ClientConfig) {
    let env_filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.log_level.clone())
    };

    if config.log_pretty {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true);
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .event_format(fmt::format().json().flatten_event(true))
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config;
    config.validate()?;

    if let Command::RelayerHealth = cli.command {
        let url = config.relayer_url.clone().ok_or_else(|| {
            ConfigError::Invalid("GASLESS_RELAYER_URL is not set".to_string())
        })?;
        let delegate = GaslessDelegate::new(url.clone(), Arc::new(PlaceholderSigner))?;
        let available = delegate.is_available().await;
        return print(&json!({ "relayer": url, "available": available }));
    }

    let service = PollService::from_config(&config)?;
    match cli.command {
        Command::Features => print(&json!({
            "contractType": service.contract_type(),
            "features": service.features(),
        })),
        Command::Polls { limit } => {
            let polls = service.active_polls(limit.unwrap_or(config.scan_limit)).await?;
            tracing::info!(count = polls.len(), "polls read");
            print(&polls)
        }
        Command::Poll { id } => print(&service.poll(id).await?),
        Command::RelayerHealth => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.config);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting poll-cli");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
