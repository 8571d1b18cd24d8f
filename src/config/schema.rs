//! Configuration schema for orca
//!
//! Configuration is stored at `~/.config/orca/config.toml`

use crate::copy::DEFAULT_CONCURRENCY;
use crate::referrers::ReferrersMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Copy engine defaults
    pub copy: CopyConfig,

    /// Local content cache
    pub cache: CacheConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: LogFormat,
}

/// Copy engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Maximum in-flight node operations per copy
    pub concurrency: usize,

    /// How referrers are discovered and recorded
    pub referrers: ReferrersMode,

    /// Keep superseded referrers indexes
    pub skip_gc: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            referrers: ReferrersMode::Auto,
            skip_gc: false,
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; `ORCA_CACHE` takes precedence. Unset disables caching.
    pub root: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[copy]"));
        assert!(toml.contains("referrers = \"auto\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.copy.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.cache.root.is_none());
        assert_eq!(config.general.log_format, LogFormat::Text);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [copy]
            referrers = "tag-scheme"

            [cache]
            root = "/var/cache/orca"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.copy.referrers, ReferrersMode::TagScheme);
        assert_eq!(config.copy.concurrency, DEFAULT_CONCURRENCY); // default preserved
        assert_eq!(config.cache.root, Some(PathBuf::from("/var/cache/orca")));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[general]\nlog_format = \"xml\"");
        assert!(result.is_err());
    }
}
