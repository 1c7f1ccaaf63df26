//! Agent orchestration -- rule loading, pipeline assembly, and lifecycle management.
//!
//! The [`Orchestrator`] turns a validated [`AgentConfig`] into a running
//! [`CollectorPipeline`], keeps an eye on its health, and drives the
//! graceful shutdown when the process is signaled.
//!
//! # Shutdown
//!
//! Stopping the pipeline cancels the file crawler between cycles. Channel
//! closure then cascades: the batcher flushes what it holds, the gateway
//! delivers or spools it, and the position tracker writes final offsets.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use tailguard_collector::{
    CollectorConfig, CollectorPipeline, CollectorPipelineBuilder, RuleEngine, RuleLoadOptions,
};
use tailguard_core::config::AgentConfig;
use tailguard_core::pipeline::{HealthStatus, Pipeline};

use crate::metrics_server;

/// Interval between pipeline health checks in the main loop.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The main agent orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: AgentConfig,
    /// The collector pipeline.
    pipeline: CollectorPipeline,
    /// Agent start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read, parsed, or validated
    /// - No rule could be loaded
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = AgentConfig::load(config_path)
            .await
            .with_context(|| format!("failed to load config {}", config_path.display()))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: AgentConfig) -> Result<Self> {
        config.validate().context("config validation failed")?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let collector_config = CollectorConfig::from_core(&config);
        let rules = load_rules(&collector_config).await?;

        let pipeline = CollectorPipelineBuilder::new()
            .config(collector_config)
            .rules(rules)
            .build()
            .context("failed to build collector pipeline")?;

        tracing::info!(rules = pipeline.rule_count(), "orchestrator initialized");

        Ok(Self {
            config,
            pipeline,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline and run until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        self.pipeline
            .start()
            .await
            .context("failed to start collector pipeline")?;

        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_tick.tick().await;

        tracing::info!("entering main loop");
        let signal = loop {
            tokio::select! {
                signal = &mut shutdown => break signal?,
                _ = health_tick.tick() => {
                    let status = self.health().await;
                    if status.is_healthy() {
                        tracing::debug!(
                            uptime_secs = self.start_time.elapsed().as_secs(),
                            "pipeline healthy"
                        );
                    } else {
                        tracing::warn!(status = %status, "pipeline health degraded");
                    }
                }
            }
        };
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown().await
    }

    /// Stop the pipeline and wait for in-flight work to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping collector pipeline");
        self.pipeline
            .stop()
            .await
            .context("failed to stop collector pipeline")
    }

    /// Current pipeline health.
    pub async fn health(&self) -> HealthStatus {
        self.pipeline.health_check().await
    }

    /// Reference to the loaded configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Mutable access to the pipeline, used to drive the lifecycle in tests.
    pub fn pipeline_mut(&mut self) -> &mut CollectorPipeline {
        &mut self.pipeline
    }
}

/// Load the rules selected by the `[input]` section.
///
/// # Errors
///
/// Returns an error if the rules directory is unreadable or yields no usable rule.
pub async fn load_rules(config: &CollectorConfig) -> Result<RuleEngine> {
    let engine = RuleEngine::load_from_dir(&config.rules_dir, &RuleLoadOptions::from_config(config))
        .await
        .with_context(|| format!("failed to load rules from {}", config.rules_dir.display()))?;

    tracing::info!(
        rules = engine.len(),
        file_rules = engine.file_rules().len(),
        dir = %config.rules_dir.display(),
        "rules loaded"
    );
    Ok(engine)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl+C handler: {}", e))?;
    Ok("CTRL_C")
}
