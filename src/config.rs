//! Configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration. Values are validated once at load time and are immutable
//! afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Largest accepted transaction timeout (ten years)
pub const MAX_TIMEOUT_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "XATM_CONFIG_READ",
            ConfigError::Parse(_) => "XATM_CONFIG_PARSE",
            ConfigError::Invalid(_) => "XATM_CONFIG_INVALID",
        }
    }
}

/// Coordinator endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Reserve the endpoint at startup (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to (default: "127.0.0.1")
    #[serde(default = "default_host")]
    pub host: String,

    /// Well-known coordinator port (default: 1099)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

impl EndpointConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Transaction manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Timeout applied when a thread has not set its own (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Upper bound on concurrently open transactions (default: 4096)
    #[serde(default = "default_max_active")]
    pub max_active_transactions: usize,

    /// Background timeout sweep period; 0 disables the reaper (default: 1000)
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,

    /// File for commit decisions; in-memory when absent
    #[serde(default)]
    pub decision_log_path: Option<PathBuf>,

    /// Resource manager names served by the CLI
    #[serde(default)]
    pub resources: Vec<String>,

    /// Log filter used when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    1099
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_active() -> usize {
    4096
}
fn default_reaper_interval_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            default_timeout_secs: default_timeout_secs(),
            max_active_transactions: default_max_active(),
            reaper_interval_ms: default_reaper_interval_ms(),
            decision_log_path: None,
            resources: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl TxConfig {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: TxConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.default_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_secs must be <= {}",
                MAX_TIMEOUT_SECS
            )));
        }

        if self.max_active_transactions == 0 {
            return Err(ConfigError::Invalid(
                "max_active_transactions must be > 0".to_string(),
            ));
        }

        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.host must not be empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.resources {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "resource names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate resource name '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Option<Duration> {
        if self.reaper_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.reaper_interval_ms))
        }
    }
}
