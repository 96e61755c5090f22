//! TOML configuration for the command gate

use crate::gate::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main gate configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Decision engine settings
    #[serde(default)]
    pub gate: EngineConfig,

    /// Extra permitted commands
    #[serde(default)]
    pub allowlist: AllowlistConfig,

    /// Secret scanning before `git commit`
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Decision engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Permitted names shown in a "not allowed" reason
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,

    /// Budget for one hook evaluation in milliseconds
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_ms: u64,
}

/// Extra permitted commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowlistConfig {
    /// Names merged into the custom tier of every profile
    #[serde(default)]
    pub custom_commands: Vec<String>,
}

/// Secret scanning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Whether `git commit` is scanned at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Characters of a matched secret revealed in reasons
    #[serde(default = "default_visible_prefix")]
    pub visible_prefix: usize,

    /// Ignore file, relative to the repository root
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,

    /// Larger files are not scanned
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl GateConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Save configuration to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read and validate a configuration file
    pub fn load(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content).map_err(|e| {
            GateError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate().map_err(GateError::InvalidConfiguration)?;
        Ok(config)
    }

    /// Load `path` if given, else the platform config file if it exists,
    /// else defaults
    pub fn load_or_default(path: Option<&Path>) -> GateResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match crate::platform_dirs::config_file() {
            Ok(default_path) if default_path.is_file() => Self::load(&default_path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.gate.hook_timeout_ms == 0 {
            return Err("gate.hook_timeout_ms must be greater than zero".to_string());
        }

        if self.secrets.visible_prefix == 0 {
            return Err("secrets.visible_prefix must be greater than zero".to_string());
        }

        if self
            .allowlist
            .custom_commands
            .iter()
            .any(|c| c.trim().is_empty())
        {
            return Err("allowlist.custom_commands cannot contain empty names".to_string());
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
            hook_timeout_ms: default_hook_timeout(),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            visible_prefix: default_visible_prefix(),
            ignore_file: default_ignore_file(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_preview_limit() -> usize {
    crate::gate::allowlist::DEFAULT_PREVIEW_LIMIT
}

fn default_hook_timeout() -> u64 {
    10_000
}

fn default_visible_prefix() -> usize {
    crate::gate::validators::git::DEFAULT_VISIBLE_PREFIX
}

fn default_ignore_file() -> String {
    ".secretsignore".to_string()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = GateConfig::new();
        let toml = config.to_toml().unwrap();
        let parsed = GateConfig::from_toml(&toml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = GateConfig::from_toml(
            r#"
            [allowlist]
            custom_commands = ["terraform"]

            [secrets]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.allowlist.custom_commands, vec!["terraform"]);
        assert!(!config.secrets.enabled);
        assert_eq!(config.secrets.visible_prefix, 12);
        assert_eq!(config.gate.preview_limit, 20);
        assert_eq!(config.gate.hook_timeout_ms, 10_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation() {
        let mut config = GateConfig::new();
        assert!(config.validate().is_ok());

        config.secrets.visible_prefix = 0;
        assert!(config.validate().is_err());

        config.secrets.visible_prefix = 4;
        config.allowlist.custom_commands.push(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[gate]\npreview_limit = 5\n").unwrap();
        assert_eq!(GateConfig::load(&path).unwrap().gate.preview_limit, 5);

        std::fs::write(&path, "[gate]\nhook_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            GateConfig::load(&path),
            Err(GateError::InvalidConfiguration(_))
        ));

        std::fs::write(&path, "[gate\n").unwrap();
        assert!(GateConfig::load_or_default(Some(&path)).is_err());
    }
}
