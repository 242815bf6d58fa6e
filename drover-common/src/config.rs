//! Configuration loading and database path resolution
//!
//! Settings resolve through a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "DROVER_CONFIG";

/// Environment variable naming the SQLite database file
pub const DATABASE_ENV_VAR: &str = "DROVER_DATABASE";

/// TOML configuration for the address migration tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

/// External address-resolution provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base URL of the resolution service
    #[serde(default = "default_resolver_base_url")]
    pub base_url: String,

    /// API key sent with every request (optional for self-hosted providers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout; expiry is treated as a transient failure
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum interval between requests (provider rate limit)
    #[serde(default = "default_resolver_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_resolver_base_url(),
            api_key: None,
            timeout_secs: default_resolver_timeout_secs(),
            min_interval_ms: default_resolver_min_interval_ms(),
        }
    }
}

/// Migration run tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Records per transactional batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum resolver attempts per record (transient failures only)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff interval; actual delay is base x attempt number
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_resolver_base_url() -> String {
    "https://resolve.drover.dev".to_string()
}

fn default_resolver_timeout_secs() -> u64 {
    30
}

fn default_resolver_min_interval_ms() -> u64 {
    200
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

/// Load TOML configuration following the priority order:
/// CLI argument, `DROVER_CONFIG`, platform config directory.
///
/// A missing file is not an error; defaults apply. A file that exists but
/// fails to parse is a hard configuration error.
pub fn load_toml_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let path = match cli_arg {
        Some(p) => Some(p.to_path_buf()),
        None => match std::env::var(CONFIG_ENV_VAR) {
            Ok(p) => Some(PathBuf::from(p)),
            Err(_) => default_config_path(),
        },
    };

    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        // Only warn when the operator explicitly named a file
        if cli_arg.is_some() || std::env::var(CONFIG_ENV_VAR).is_ok() {
            warn!("Config file not found: {} (using defaults)", path.display());
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the database file path following the priority order:
/// CLI argument, `DROVER_DATABASE`, TOML `database` key, OS default.
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.database {
        return PathBuf::from(path);
    }

    default_data_dir().join("drover.db")
}

/// Default config file path for the platform (`~/.config/drover/drover-am.toml`)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("drover").join("drover-am.toml"))
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("drover"))
        .unwrap_or_else(|| PathBuf::from("./drover_data"))
}
