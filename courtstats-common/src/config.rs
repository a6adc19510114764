//! Configuration loading and config file resolution
//!
//! Settings come from one TOML file. Every key has a compiled default, so a
//! missing file only produces a warning; a file that exists but does not
//! parse is an error.

use crate::fields::{BATCH_LIMIT, MAX_RECENT_RESULTS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "COURTSTATS_CONFIG";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5790";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub log_level: String,
    pub aggregation: AggregationConfig,
    pub reconciliation: ReconciliationConfig,
    pub cache_rebuild: CacheRebuildConfig,
    pub auth: AuthConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            log_level: "info".to_string(),
            aggregation: AggregationConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            cache_rebuild: CacheRebuildConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Operations per committed batch, clamped to 1..=499
    pub batch_limit: usize,
    pub max_recent_results: usize,
    /// How long the recent-results transaction keeps retrying on conflict
    pub transaction_max_wait_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            batch_limit: BATCH_LIMIT,
            max_recent_results: MAX_RECENT_RESULTS,
            transaction_max_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheRebuildConfig {
    /// Endpoint receiving `{"seasonId": ..}`; no URL disables rebuilds
    pub webhook_url: Option<String>,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub queue_capacity: usize,
}

impl Default for CacheRebuildConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_attempts: 3,
            initial_backoff_ms: 500,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Skip the admin check entirely (local development only)
    pub disabled: bool,
    pub admin_subjects: Vec<String>,
    pub tokens: Vec<TokenEntry>,
}

/// A known bearer token, stored as the hex SHA-256 of the token text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub subject: String,
    pub sha256: String,
}

impl TomlConfig {
    /// Normalize out-of-range values
    pub fn validated(mut self) -> Self {
        let limit = self.aggregation.batch_limit.clamp(1, BATCH_LIMIT);
        if limit != self.aggregation.batch_limit {
            warn!(
                configured = self.aggregation.batch_limit,
                using = limit,
                "aggregation.batch_limit out of range, clamped"
            );
            self.aggregation.batch_limit = limit;
        }
        if self.aggregation.max_recent_results == 0 {
            warn!("aggregation.max_recent_results must be at least 1, using default");
            self.aggregation.max_recent_results = MAX_RECENT_RESULTS;
        }
        if self.cache_rebuild.max_attempts == 0 {
            self.cache_rebuild.max_attempts = 1;
        }
        if self.cache_rebuild.queue_capacity == 0 {
            self.cache_rebuild.queue_capacity = 1;
        }
        self
    }
}

/// Config file resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `COURTSTATS_CONFIG` environment variable
/// 3. `~/.config/courtstats/config.toml`
/// 4. `/etc/courtstats/config.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("courtstats").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/courtstats/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load configuration; missing file → defaults, malformed file → error
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        warn!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(TomlConfig::default());
    }

    let config = load_config_file(&path)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Parse a specific config file
pub fn load_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config.validated())
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("courtstats"))
        .unwrap_or_else(|| PathBuf::from("./courtstats_data"))
        .join("courtstats.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1:5790");
        assert_eq!(config.aggregation.batch_limit, 499);
        assert_eq!(config.aggregation.max_recent_results, 20);
        assert!(config.reconciliation.enabled);
        assert!(config.cache_rebuild.webhook_url.is_none());
        assert!(!config.auth.disabled);
        assert!(config.database_path.ends_with("courtstats.db"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            log_level = "debug"

            [aggregation]
            batch_limit = 100

            [[auth.tokens]]
            subject = "ops"
            sha256 = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.aggregation.batch_limit, 100);
        assert_eq!(config.aggregation.max_recent_results, 20);
        assert_eq!(config.auth.tokens[0].subject, "ops");
        assert_eq!(config.reconciliation.interval_secs, 86_400);
    }

    #[test]
    fn test_batch_limit_clamped() {
        let mut config = TomlConfig::default();
        config.aggregation.batch_limit = 5000;
        assert_eq!(config.validated().aggregation.batch_limit, 499);

        let mut config = TomlConfig::default();
        config.aggregation.batch_limit = 0;
        assert_eq!(config.validated().aggregation.batch_limit, 1);
    }
}
