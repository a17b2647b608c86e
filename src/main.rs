//! AWS Organization Auditor - CLI
//!
//! `aws-auditor audit` runs one read-only audit of every member account.
//! `aws-auditor serve` exposes the egress IP health endpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use aws_auditor::aws::AwsServiceFactory;
use aws_auditor::health::{self, HealthState};
use aws_auditor::{AuditConfig, Auditor, CredentialBroker, TracingSink};

/// Multi-account AWS compliance auditor
#[derive(Parser, Debug)]
#[command(name = "aws-auditor", version, about)]
struct Cli {
    /// JSON configuration file (defaults are compiled in)
    #[arg(long, global = true, env = "AUDITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum concurrent work units per account
    #[arg(long, global = true, env = "AUDITOR_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit all member accounts once (default)
    Audit,

    /// Serve the health endpoint
    Serve {
        #[arg(long, default_value = "8080", env = "PORT")]
        port: u16,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<AuditConfig> {
    let mut config = match &cli.config {
        Some(path) => AuditConfig::load(path)?,
        None => AuditConfig::default(),
    };

    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let config = load_config(&cli).context("Failed to load configuration")?;

    match cli.command {
        None | Some(Command::Audit) => audit(config, cli.json).await,
        Some(Command::Serve { port }) => serve(config, port).await,
    }
}

async fn audit(config: AuditConfig, json: bool) -> Result<()> {
    let config = Arc::new(config);
    let factory = Arc::new(AwsServiceFactory::load().await);
    let assumer = Arc::new(factory.role_assumer(&config.home_region));
    let broker = CredentialBroker::from_config(assumer, &config);

    let auditor = Auditor::new(config, broker, factory, Arc::new(TracingSink::new()));
    let summary = auditor.run().await.context("Audit run failed")?;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    }

    Ok(())
}

async fn serve(config: AuditConfig, port: u16) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let state = HealthState::new(client, &config.health_check_address);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(address = %config.health_check_address, "Starting health endpoint");

    health::serve(addr, state).await
}
