//! Configuration file resolution and graceful degradation
//!
//! Tests that touch COURTSTATS_CONFIG are #[serial] so they never race on
//! the process environment.

use courtstats_common::config::{load_config, resolve_config_path, CONFIG_ENV_VAR};
use courtstats_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_beats_environment() {
    let dir = TempDir::new().unwrap();
    let cli = dir.path().join("cli.toml");
    env::set_var(CONFIG_ENV_VAR, dir.path().join("env.toml"));

    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_variable_used_without_cli() {
    let dir = TempDir::new().unwrap();
    let env_path = dir.path().join("env.toml");
    fs::write(&env_path, "bind_address = \"0.0.0.0:9000\"\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &env_path);

    assert_eq!(resolve_config_path(None), Some(env_path));
    let config = load_config(None).unwrap();
    assert_eq!(config.bind_address, "0.0.0.0:9000");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = load_config(Some(&missing)).unwrap();
    assert_eq!(config.bind_address, "127.0.0.1:5790");
    assert_eq!(config.aggregation.batch_limit, 499);
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[aggregation\nbatch_limit = ").unwrap();

    let result = load_config(Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_full_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
database_path = "/var/lib/courtstats/stats.db"
log_level = "debug"

[aggregation]
batch_limit = 900
max_recent_results = 10

[reconciliation]
enabled = false

[cache_rebuild]
webhook_url = "http://localhost:8080/rebuild"
max_attempts = 5

[auth]
admin_subjects = ["ops"]
tokens = [{ subject = "ops", sha256 = "00ff" }]
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.database_path.to_string_lossy(), "/var/lib/courtstats/stats.db");
    // Clamped to the per-commit ceiling
    assert_eq!(config.aggregation.batch_limit, 499);
    assert_eq!(config.aggregation.max_recent_results, 10);
    assert!(!config.reconciliation.enabled);
    assert_eq!(
        config.cache_rebuild.webhook_url.as_deref(),
        Some("http://localhost:8080/rebuild")
    );
    assert_eq!(config.cache_rebuild.max_attempts, 5);
    assert_eq!(config.cache_rebuild.queue_capacity, 64);
    assert_eq!(config.auth.admin_subjects, vec!["ops".to_string()]);
    assert_eq!(config.auth.tokens[0].sha256, "00ff");
}
