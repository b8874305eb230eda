//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional YAML file, then
//! command-line overrides applied by the binary.

use crate::storage::StoreOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for the store, the engine's time bounds, and logging.
///
/// Every field is optional in the YAML file:
///
/// ```yaml
/// db_path: /var/lib/identify/contacts.db
/// acquire_timeout_ms: 5000
/// unit_timeout_ms: 10000
/// max_connections: 4
/// request_timeout_ms: 15000
/// log_level: info
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub db_path: PathBuf,
    pub acquire_timeout_ms: u64,
    pub unit_timeout_ms: u64,
    pub max_connections: usize,
    pub request_timeout_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            db_path: default_db_path(),
            acquire_timeout_ms: store.acquire_timeout.as_millis() as u64,
            unit_timeout_ms: store.unit_timeout.as_millis() as u64,
            max_connections: store.max_connections,
            request_timeout_ms: 15_000,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Defaults, overlaid by `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit, not as an empty mapping
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid("acquire_timeout_ms must be > 0".into()));
        }
        if self.unit_timeout_ms == 0 {
            return Err(ConfigError::Invalid("unit_timeout_ms must be > 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be > 0".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be > 0".into()));
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            unit_timeout: Duration::from_millis(self.unit_timeout_ms),
            max_connections: self.max_connections,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Get the default database path (~/.local/share/identify/identify.db)
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("identify").join("identify.db")
}
