//! # Gantry Configuration
//!
//! Configuration management with support for:
//! - Multiple formats (YAML, TOML, JSON)
//! - Environment variable expansion (`${VAR}`, `${VAR:-default}`)
//! - Range validation of every section
//! - Default values

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod loader;
pub mod types;
pub mod validator;

pub use builder::ConfigBuilder;
pub use loader::{expand_env_vars, load_config, load_from_file, load_from_str};
pub use types::{
    ApiKeyEntry, AuthConfig, Config, LoggingConfig, MiddlewareConfig, ServerConfig,
};
pub use validator::validate_config;

use gantry_core::{Error, Result};
use std::path::Path;

/// Load and validate configuration from a file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_config(path)
}

/// Load configuration from a string
pub fn load_str(content: &str, format: ConfigFormat) -> Result<Config> {
    load_from_str(content, format)
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                Error::Config(format!(
                    "{} has no extension; use .yaml, .yml, .toml or .json",
                    path.display()
                ))
            })?;

        match ext.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            other => Err(Error::Config(format!("Unsupported config format: .{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("gantry.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_extension_case() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("/etc/gantry/APP.YAML")).unwrap(),
            ConfigFormat::Yaml
        );
    }

    #[test]
    fn test_unsupported_format() {
        assert!(ConfigFormat::from_path(&PathBuf::from("config.txt")).is_err());
        assert!(ConfigFormat::from_path(&PathBuf::from("config")).is_err());
    }
}
