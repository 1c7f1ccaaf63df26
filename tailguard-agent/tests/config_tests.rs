//! Configuration loading tests from the agent's point of view.

use std::io::Write;

use tailguard_agent::cli::AgentCli;
use tailguard_collector::CollectorConfig;
use tailguard_core::config::{AgentConfig, DEV_COLLECTOR_URL};
use clap::Parser;

#[tokio::test]
async fn test_load_file_and_apply_cli_overrides() {
    // Given: a config file on disk
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[general]
log_level = "warn"
state_dir = "/var/lib/tailguard"

[output]
access_token = "token"
server_key = "key"
environment = "dev"

[input]
idle_timeout_secs = 30
"#
    )
    .unwrap();

    // When: loading and applying CLI overrides
    let mut config = AgentConfig::load(file.path()).await.unwrap();
    let cli = AgentCli::parse_from(["tailguard-agent", "--log-level", "trace"]);
    cli.apply_overrides(&mut config);

    // Then: CLI wins, file values survive, collector settings follow
    assert_eq!(config.general.log_level, "trace");
    assert!(config.validate().is_ok());

    let collector = CollectorConfig::from_core(&config);
    assert_eq!(collector.collector_url, DEV_COLLECTOR_URL);
    assert_eq!(collector.idle_timeout_secs, 30);
    assert_eq!(collector.access_token, "token");
    assert_eq!(
        collector.state_file(),
        std::path::Path::new("/var/lib/tailguard/.tailguard-state")
    );
}

#[test]
fn test_invalid_cli_log_level_fails_validation() {
    let mut config = AgentConfig::default();
    let cli = AgentCli::parse_from(["tailguard-agent", "--log-level", "loud"]);
    cli.apply_overrides(&mut config);
    assert!(config.validate().is_err());
}
