//! Runtime configuration for vendor-cache.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Tier sizing, retention windows and storage locations live here; the
//! provider API key comes from the environment (optionally via `.env`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "vendor-cache", about = "Multi-tier caching API for vendor financial data")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A valid {0} must be set in the environment or .env file")]
    MissingApiKey(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream provider configuration.
    pub provider: ProviderConfig,

    /// Cache tier configuration.
    pub tiers: TierConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8000").
    pub listen: String,

    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:5174".to_string(),
                "http://127.0.0.1:5174".to_string(),
            ],
        }
    }
}

/// Provider client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Query endpoint.
    pub base_url: String,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co/query".to_string(),
            timeout_secs: 10,
            api_key_env: "ALPHA_VANTAGE_API_KEY".to_string(),
        }
    }
}

/// Tier capacity, retention and path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Maximum entries held by the volatile tier.
    pub volatile_capacity: usize,

    /// Volatile entry lifetime in seconds.
    pub volatile_ttl_secs: u64,

    /// SQLite database backing the record store.
    pub record_db_path: PathBuf,

    /// Directory holding flat cache files.
    pub file_cache_dir: PathBuf,

    /// Retention window for both durable tiers, in days.
    pub retention_days: u32,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            volatile_capacity: 200,
            volatile_ttl_secs: 3600,
            record_db_path: PathBuf::from("cache/vendor_cache.db"),
            file_cache_dir: PathBuf::from("cache/files"),
            retention_days: 7,
        }
    }
}

impl TierConfig {
    pub fn volatile_ttl(&self) -> Duration {
        Duration::from_secs(self.volatile_ttl_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// The same retention window, for mtime comparisons.
    pub fn file_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 3600)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

/// Read the provider API key, re-reading `.env` so edits take effect.
pub fn load_api_key(var: &str) -> Result<String, ConfigError> {
    if let Err(e) = dotenvy::dotenv_override() {
        tracing::debug!(error = %e, "No .env file loaded");
    }
    validate_api_key(var, std::env::var(var).ok())
}

fn validate_api_key(var: &str, value: Option<String>) -> Result<String, ConfigError> {
    match value.map(|v| v.trim().to_string()) {
        Some(key) if !key.is_empty() && key != "demo" => Ok(key),
        _ => Err(ConfigError::MissingApiKey(var.to_string())),
    }
}
