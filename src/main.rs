use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tunnelgate::cli::Cli;
use tunnelgate::config::Config;
use tunnelgate::orchestrator::{Orchestrator, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::resolve(&cli).context("invalid configuration")?;

    let mut orchestrator = Orchestrator::new(cfg);
    orchestrator
        .run(shutdown_signal())
        .await
        .context("startup failed")?;

    Ok(())
}
