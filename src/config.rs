//! Server configuration and API keys.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("OMNIPA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_path = std::env::var("OMNIPA_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("omnipa-server")
                    .join("omnipa.db")
            });

        let config_path = std::env::var("OMNIPA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("omnipa-server")
                    .join("config.yaml")
            });

        Self {
            port,
            database_path,
            config_path,
        }
    }
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from config file
    pub fn load(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => {
                    let store = Self::from_entries(config.api_keys);
                    tracing::info!("Loaded {} API key(s)", store.len());
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.key,
                    AuthUser {
                        user_id: entry.user_id,
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
