use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per storage key
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Largest serialized value a single write may store (browser quota is ~5MB)
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_value_bytes() -> usize {
    5 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the mock REST backend, including the `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

/// Artificial latencies applied by the mock services
#[derive(Debug, Clone, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_auth_delay_ms")]
    pub auth_delay_ms: u64,
    #[serde(default = "default_oauth_delay_ms")]
    pub oauth_delay_ms: u64,
    #[serde(default = "default_connection_delay_ms")]
    pub connection_delay_ms: u64,
}

impl MockConfig {
    /// All delays set to zero, for tests and scripted runs
    pub fn instant() -> Self {
        Self {
            auth_delay_ms: 0,
            oauth_delay_ms: 0,
            connection_delay_ms: 0,
        }
    }

    pub fn auth_delay(&self) -> Duration {
        Duration::from_millis(self.auth_delay_ms)
    }

    pub fn oauth_delay(&self) -> Duration {
        Duration::from_millis(self.oauth_delay_ms)
    }

    pub fn connection_delay(&self) -> Duration {
        Duration::from_millis(self.connection_delay_ms)
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            auth_delay_ms: default_auth_delay_ms(),
            oauth_delay_ms: default_oauth_delay_ms(),
            connection_delay_ms: default_connection_delay_ms(),
        }
    }
}

fn default_auth_delay_ms() -> u64 {
    800
}

fn default_oauth_delay_ms() -> u64 {
    1500
}

fn default_connection_delay_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    /// Number of activity log entries kept per user (oldest are dropped)
    #[serde(default = "default_activity_limit")]
    pub activity_limit: usize,
    /// Target band assigned to new progress records
    #[serde(default = "default_target_band")]
    pub default_target_band: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            activity_limit: default_activity_limit(),
            default_target_band: default_target_band(),
        }
    }
}

fn default_activity_limit() -> usize {
    50
}

fn default_target_band() -> f64 {
    7.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Filter directive to use: the `--log-level` flag wins over `RUST_LOG`,
    /// which wins over the configured level
    pub fn directive(&self, flag: Option<&str>, env: Option<&str>) -> String {
        flag.or(env)
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or(&self.level)
            .to_string()
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }
}
