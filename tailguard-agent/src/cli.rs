//! CLI argument definitions for tailguard-agent.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Tailguard security log collection agent.
///
/// Tails log files matched by the configured rules, extracts security
/// events, and delivers them in batches to the collector service.
#[derive(Parser, Debug)]
#[command(name = "tailguard-agent")]
#[command(version, about, long_about = None)]
pub struct AgentCli {
    /// Path to tailguard.toml configuration file.
    #[arg(short, long, default_value = "/etc/tailguard/tailguard.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and rules, then exit without starting the agent.
    #[arg(long)]
    pub validate: bool,
}

impl AgentCli {
    /// Apply CLI overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut tailguard_core::AgentConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
    }
}
