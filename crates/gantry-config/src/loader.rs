//! Configuration loading

use crate::{Config, ConfigFormat};
use gantry_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::env;
use std::fs;
use std::path::Path;

// ${VAR} or ${VAR:-default}
static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").expect("valid env var regex")
});

/// Load configuration from a file, format chosen by extension
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    tracing::debug!(path = %path.display(), format = ?format, "Loading configuration");
    load_from_str(&content, format)
}

/// Expand environment variables in configuration string
///
/// Supports `${VAR}` and `${VAR:-default}`. An unset variable without a
/// default is an error; a variable set to the empty string counts as set.
/// Lines whose first non-blank character is `#` are YAML/TOML comments and
/// are copied unchanged. Trailing comments after a value are expanded.
pub fn expand_env_vars(content: &str) -> Result<String> {
    let mut missing = None;
    let mut expanded = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            expanded.push_str(line);
            continue;
        }

        let line = ENV_VAR.replace_all(line, |cap: &Captures<'_>| {
            let name = &cap[1];
            match (env::var(name), cap.get(3)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        expanded.push_str(&line);
    }

    match missing {
        Some(name) => Err(Error::Config(format!(
            "Environment variable '{name}' not set and no default provided"
        ))),
        None => Ok(expanded),
    }
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    let expanded = expand_env_vars(content)?;

    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(config)
}

/// Load and validate configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;
    crate::validator::validate_config(&config)?;
    Ok(config)
}
