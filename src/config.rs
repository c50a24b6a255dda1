//! Configuration management for Amp Link
//!
//! Handles loading, parsing and validation of the YAML configuration file. Every
//! section is optional; a missing file section falls back to defaults.

use crate::engine::{EngineConfig, DEFAULT_COALESCE_WINDOW_MS, DEFAULT_COMMAND_TIMEOUT_MS};
use crate::fx_id::{FxIdNormalizer, DEFAULT_NAMESPACE, REVERB_FAMILY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Amp model identifiers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Prefix qualifying effect ids, including the trailing dot
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Effect family whose variants share one id in change commands
    #[serde(default = "default_reverb_family")]
    pub reverb_family: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            reverb_family: default_reverb_family(),
        }
    }
}

impl DeviceConfig {
    pub fn normalizer(&self) -> FxIdNormalizer {
        FxIdNormalizer::new(self.namespace.clone()).with_families(vec![self.reverb_family.clone()])
    }
}

/// Engine timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Parameter edit coalescing window
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
    /// Bound on a single transport call
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl EngineSettings {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            coalesce_window: Duration::from_millis(self.coalesce_window_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }
}

/// Effects catalog source
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// JSON catalog replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Log output
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write a daily rolling log file
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load `path` if it exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.namespace.is_empty() {
            anyhow::bail!("device.namespace cannot be empty");
        }
        if !self.device.namespace.ends_with('.') {
            anyhow::bail!(
                "device.namespace '{}' must end with '.'",
                self.device.namespace
            );
        }
        if self.device.reverb_family.trim().is_empty() {
            anyhow::bail!("device.reverb_family cannot be empty");
        }

        if !(1..=1000).contains(&self.engine.coalesce_window_ms) {
            anyhow::bail!(
                "engine.coalesce_window_ms must be between 1 and 1000 (got {})",
                self.engine.coalesce_window_ms
            );
        }
        if self.engine.command_timeout_ms == 0 {
            anyhow::bail!("engine.command_timeout_ms must be greater than 0");
        }

        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level cannot be empty");
        }

        Ok(())
    }
}

fn default_namespace() -> String { DEFAULT_NAMESPACE.to_string() }
fn default_reverb_family() -> String { REVERB_FAMILY.to_string() }
fn default_coalesce_window_ms() -> u64 { DEFAULT_COALESCE_WINDOW_MS }
fn default_command_timeout_ms() -> u64 { DEFAULT_COMMAND_TIMEOUT_MS }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.device.namespace, "pg.spark40.");
        assert_eq!(config.engine.coalesce_window_ms, 50);
        assert_eq!(config.engine.command_timeout_ms, 3000);
        assert!(config.logging.file);
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
engine:
  coalesce_window_ms: 80
logging:
  level: debug
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.engine.coalesce_window_ms, 80);
        assert_eq!(config.engine.command_timeout_ms, 3000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.engine.to_engine_config().coalesce_window,
            Duration::from_millis(80)
        );
    }

    #[test]
    fn test_validation_errors() {
        assert!(AppConfig::from_yaml("device:\n  namespace: pg.spark40").is_err());
        assert!(AppConfig::from_yaml("engine:\n  coalesce_window_ms: 0").is_err());
        assert!(AppConfig::from_yaml("engine:\n  coalesce_window_ms: 5000").is_err());
        assert!(AppConfig::from_yaml("engine:\n  command_timeout_ms: 0").is_err());
        assert!(AppConfig::from_yaml("logging:\n  level: ''").is_err());
    }

    #[test]
    fn test_normalizer_from_config() {
        let yaml = "device:\n  namespace: pg.spark2.\n  reverb_family: bias.verb\n";
        let ids = AppConfig::from_yaml(yaml).unwrap().device.normalizer();
        assert_eq!(ids.expand("Twin"), "pg.spark2.Twin");
        assert_eq!(ids.normalize("pg.spark2.bias.verb.3"), "bias.verb");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.yaml");
        tokio::fs::write(&path, "catalog:\n  path: my_catalog.json\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.catalog.path, Some(PathBuf::from("my_catalog.json")));

        let missing = AppConfig::load_or_default(temp.path().join("nope.yaml"))
            .await
            .unwrap();
        assert_eq!(missing, AppConfig::default());
    }
}
