//! Configuration management for the interface registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (interfaces.toml)
//! - Environment variables (AMR_INTERFACES__*)
//!
//! ## Example config file (interfaces.toml):
//! ```toml
//! [registry]
//! manifest_dirs = ["./interfaces", "/opt/robot/interfaces"]
//! include_bundled = true
//!
//! [codec]
//! max_sequence_len = 1048576
//! max_string_len = 16777216
//!
//! [codegen]
//! derive_serde = true
//!
//! [logging]
//! filter = "amr_interfaces=info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::CodecLimits;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfacesConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub codegen: CodegenConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where interface manifests come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directories scanned for `*.json` manifests
    #[serde(default)]
    pub manifest_dirs: Vec<PathBuf>,

    /// Register the interfaces embedded in the crate
    #[serde(default = "default_true")]
    pub include_bundled: bool,
}

/// Length prefix limits applied by the codec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_max_sequence_len")]
    pub max_sequence_len: usize,

    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,
}

/// Rust binding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Add serde derives to generated types
    #[serde(default = "default_true")]
    pub derive_serde: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_sequence_len() -> usize {
    CodecLimits::default().max_sequence_len
}

fn default_max_string_len() -> usize {
    CodecLimits::default().max_string_len
}

fn default_filter() -> String {
    "amr_interfaces=info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            manifest_dirs: Vec::new(),
            include_bundled: true,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_sequence_len: default_max_sequence_len(),
            max_string_len: default_max_string_len(),
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self { derive_serde: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl CodecConfig {
    pub fn limits(&self) -> CodecLimits {
        CodecLimits {
            max_sequence_len: self.max_sequence_len,
            max_string_len: self.max_string_len,
        }
    }
}

impl InterfacesConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "interfaces.toml",
            ".interfaces.toml",
            "config/interfaces.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "amr-interfaces") {
            let xdg_config = config_dir.config_dir().join("interfaces.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // AMR_INTERFACES__CODEC__MAX_STRING_LEN=...
        builder = builder.add_source(
            Environment::with_prefix("AMR_INTERFACES")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Manifest directories with relative paths resolved against the working directory
    pub fn manifest_dirs(&self) -> Vec<PathBuf> {
        self.registry
            .manifest_dirs
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    std::env::current_dir().unwrap_or_default().join(p)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = InterfacesConfig::default();
        assert!(config.registry.include_bundled);
        assert_eq!(config.codec.limits(), CodecLimits::default());
    }

    #[test]
    fn test_serialize_config() {
        let config = InterfacesConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[registry]"));
        assert!(toml_str.contains("[codec]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[codec]\nmax_sequence_len = 16\n\n[registry]\ninclude_bundled = false\n",
        )
        .unwrap();

        let config = InterfacesConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.codec.max_sequence_len, 16);
        assert_eq!(config.codec.max_string_len, CodecLimits::default().max_string_len);
        assert!(!config.registry.include_bundled);
    }
}
