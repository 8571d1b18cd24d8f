//! Configuration management for orca

pub mod schema;

pub use schema::{Config, LogFormat};

use crate::error::{OrcaError, OrcaResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "ORCA_CONFIG";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orca")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub async fn load(&self) -> OrcaResult<Config> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> OrcaResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| OrcaError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| OrcaError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if config.copy.concurrency == 0 {
            return Err(OrcaError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "copy.concurrency must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> OrcaResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            OrcaError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    async fn ensure_config_dir(&self) -> OrcaResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OrcaError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
