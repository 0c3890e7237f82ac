//! Configuration validation

use crate::types::{Config, LoggingConfig, ServerConfig};
use gantry_core::{Error, Result};
use std::time::Duration;

/// Longest accepted application name
pub const MAX_APP_NAME_LEN: usize = 64;

/// Largest accepted request body limit (1 GiB)
pub const MAX_BODY_LIMIT: usize = 1024 * 1024 * 1024;

/// Timeouts above this are accepted with a warning
pub const LONG_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Longest accepted graceful shutdown window
pub const MAX_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(&config.server)?;

    if let Some(cors) = &config.cors {
        cors.validate()?;
    }

    if let Some(csrf) = &config.csrf {
        csrf.validate()?;
    }

    if let Some(jwt) = &config.auth.jwt {
        jwt.validate()?;
    }

    for entry in &config.auth.api_keys {
        if entry.id.is_empty() || entry.key.is_empty() {
            return Err(Error::Config(
                "api key id and key cannot be empty".to_string(),
            ));
        }
    }

    if config.middleware.request_id
        && http::HeaderName::from_bytes(config.middleware.request_id_header.as_bytes()).is_err()
    {
        return Err(Error::Config(format!(
            "invalid request id header: {}",
            config.middleware.request_id_header
        )));
    }

    validate_logging(&config.logging)?;

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<()> {
    server.listen_addr()?;

    if server.app_name.chars().count() > MAX_APP_NAME_LEN {
        return Err(Error::Config(format!(
            "app_name must be at most {MAX_APP_NAME_LEN} characters"
        )));
    }

    if server.body_limit == 0 || server.body_limit > MAX_BODY_LIMIT {
        return Err(Error::Config(format!(
            "body_limit must be between 1 and {MAX_BODY_LIMIT} bytes"
        )));
    }

    for (name, value) in [
        ("read_timeout", server.read_timeout),
        ("write_timeout", server.write_timeout),
        ("idle_timeout", server.idle_timeout),
    ] {
        if value.is_zero() {
            return Err(Error::Config(format!("{name} must be > 0")));
        }
        if value > LONG_TIMEOUT {
            tracing::warn!(
                setting = name,
                seconds = value.as_secs(),
                "Timeout is very high (>10 minutes)"
            );
        }
    }

    if server.shutdown_timeout > MAX_SHUTDOWN_TIMEOUT {
        return Err(Error::Config(
            "shutdown_timeout must be at most 5 minutes".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<()> {
    match logging.level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => {
            return Err(Error::Config(format!(
                "Invalid log level: {other} (must be trace, debug, info, warn or error)"
            )))
        }
    }

    match logging.format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Error::Config(format!(
            "Invalid log format: {other} (must be text or json)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiKeyEntry;
    use gantry_auth::JwtConfig;
    use gantry_middleware::{CorsConfig, CsrfConfig};

    #[test]
    fn test_valid_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_listen() {
        let mut config = Config::default();
        config.server.listen = "not-an-address".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_app_name_length() {
        let mut config = Config::default();
        config.server.app_name = "x".repeat(MAX_APP_NAME_LEN);
        assert!(validate_config(&config).is_ok());

        config.server.app_name.push('x');
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_body_limit_range() {
        let mut config = Config::default();
        config.server.body_limit = 0;
        assert!(validate_config(&config).is_err());

        config.server.body_limit = MAX_BODY_LIMIT;
        assert!(validate_config(&config).is_ok());

        config.server.body_limit = MAX_BODY_LIMIT + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_timeouts() {
        let mut config = Config::default();
        config.server.write_timeout = Duration::ZERO;
        assert!(validate_config(&config).is_err());

        // Long but legal
        let mut config = Config::default();
        config.server.idle_timeout = Duration::from_secs(3600);
        assert!(validate_config(&config).is_ok());

        let mut config = Config::default();
        config.server.shutdown_timeout = Duration::from_secs(301);
        assert!(validate_config(&config).is_err());

        config.server.shutdown_timeout = Duration::ZERO;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_sections_use_their_own_rules() {
        let mut config = Config::default();
        let mut cors = CorsConfig::for_origins(["*"]);
        cors.allow_credentials = true;
        config.cors = Some(cors);
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.csrf = Some(CsrfConfig {
            cookie_name: String::new(),
            ..Default::default()
        });
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.auth.jwt = Some(JwtConfig::default());
        assert!(validate_config(&config).is_err());

        config.auth.jwt = Some(JwtConfig::hmac("0123456789abcdef0123456789abcdef"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_api_keys() {
        let mut config = Config::default();
        config.auth.api_keys.push(ApiKeyEntry {
            id: "ci".to_string(),
            key: String::new(),
            owner: "bot".to_string(),
            scopes: vec![],
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_logging() {
        let mut config = Config::default();
        config.logging.level = "WARN".to_string();
        assert!(validate_config(&config).is_ok());

        config.logging.level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());
    }
}
