use anyhow::{Context, Result};
use clap::Parser;

use tailguard_agent::cli::AgentCli;
use tailguard_agent::logging;
use tailguard_agent::orchestrator::{self, Orchestrator};
use tailguard_collector::CollectorConfig;
use tailguard_core::config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AgentCli::parse();

    let mut config = AgentConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    logging::init_tracing(&config.general)?;

    if cli.validate {
        let rules = orchestrator::load_rules(&CollectorConfig::from_core(&config)).await?;
        tracing::info!(
            config = %cli.config.display(),
            rules = rules.len(),
            "configuration is valid"
        );
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "tailguard-agent starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("tailguard-agent shut down");
    Ok(())
}
