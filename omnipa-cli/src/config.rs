use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use omnipa_core::SyncOptions;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_true() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

fn default_stale_secs() -> u64 {
    300
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// API key for authentication
    pub api_key: Option<String>,
    /// Replay queued changes at startup when the server is reachable (default: true)
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    /// Wait after reconnecting before replaying the queue
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Give up on a change after this many failed replays (default: never)
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Health check timeout used to decide whether we are online
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            auto_sync: default_true(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_attempts: None,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Returns true if sync is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Read cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds an online read stays fresh
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_secs: default_stale_secs(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local mirror and the pending-change queue
    pub data_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
    /// Read cache configuration
    pub cache: CacheConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    sync: Option<SyncConfig>,
    cache: Option<CacheConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();
        let mut cache = CacheConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                data_dir = ConfigValue::new(resolve_path(&path, dir), ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
            if let Some(cache_config) = file_config.cache {
                cache = cache_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("OMNIPA_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("OMNIPA_SERVER_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("OMNIPA_API_KEY") {
            sync.api_key = Some(key);
        }

        Ok(Self {
            data_dir,
            config_file,
            sync,
            cache,
        })
    }

    /// Options for the shopping sync service.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            stale_time: Duration::from_secs(self.cache.stale_secs),
            reconnect_delay: Duration::from_millis(self.sync.reconnect_delay_ms),
            max_attempts: self.sync.max_attempts,
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/omnipa/
    /// - macOS: ~/Library/Application Support/omnipa/
    /// - Windows: %APPDATA%/omnipa/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omnipa")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/omnipa/
    /// - macOS: ~/Library/Application Support/omnipa/
    /// - Windows: %APPDATA%/omnipa/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omnipa")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Expand `~/` and resolve relative paths against the config file's directory.
fn resolve_path(config_path: &Path, path: PathBuf) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&path))
            .unwrap_or(path)
    } else {
        path
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
