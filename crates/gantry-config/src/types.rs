//! Configuration types

use gantry_auth::{ApiKey, JwtConfig};
use gantry_core::{Error, Result};
use gantry_middleware::{CorsConfig, CsrfConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Server-wide CORS; absent means no global CORS middleware
    pub cors: Option<CorsConfig>,

    /// CSRF protection; absent means disabled
    pub csrf: Option<CsrfConfig>,

    /// Authentication backends
    pub auth: AuthConfig,

    /// Built-in middleware switches
    pub middleware: MiddlewareConfig,

    /// Logging
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (`host:port`)
    pub listen: String,

    /// Application name, sent in the `Server` header
    pub app_name: String,

    /// Max request body size (bytes)
    pub body_limit: usize,

    /// Deadline for reading a request body
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Deadline for producing a response (handler plus middleware)
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// How long a keep-alive connection may wait for its next request
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Graceful shutdown timeout (wait for in-flight requests)
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Trust `X-Forwarded-*` headers for client IP, host and scheme
    pub trust_proxy: bool,

    /// `/About` and `/about` are different routes
    pub case_sensitive: bool,

    /// `/users/` and `/users` are different routes
    pub strict_routing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            app_name: "gantry".to_string(),
            body_limit: default_body_limit(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
            trust_proxy: false,
            case_sensitive: false,
            strict_routing: false,
        }
    }
}

impl ServerConfig {
    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address '{}': {e}", self.listen)))
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT bearer authentication
    pub jwt: Option<JwtConfig>,

    /// Static API keys
    pub api_keys: Vec<ApiKeyEntry>,
}

/// API key declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyEntry {
    /// Key identifier
    pub id: String,

    /// Key value presented by clients
    pub key: String,

    /// Owner, becomes the principal subject
    pub owner: String,

    /// Scopes, become principal permissions
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl From<&ApiKeyEntry> for ApiKey {
    fn from(entry: &ApiKeyEntry) -> Self {
        entry
            .scopes
            .iter()
            .fold(ApiKey::new(&entry.id, &entry.key, &entry.owner), |key, scope| {
                key.with_scope(scope)
            })
    }
}

/// Built-in middleware switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Convert handler panics into 500 responses
    pub recover: bool,

    /// Assign and echo request ids
    pub request_id: bool,

    /// Header carrying the request id
    pub request_id_header: String,

    /// Log every request
    pub request_logging: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            recover: true,
            request_id: true,
            request_id_header: "X-Request-ID".to_string(),
            request_logging: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: String,

    /// Log request headers
    pub log_headers: bool,

    /// Paths excluded from request logging
    pub skip_paths: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            log_headers: false,
            skip_paths: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Parsed log level
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| Error::Config(format!("invalid log level: {}", self.level)))
    }

    /// Settings for the request logging middleware
    pub fn request_logging(&self) -> Result<gantry_middleware::LoggingConfig> {
        Ok(gantry_middleware::LoggingConfig {
            log_level: self.tracing_level()?,
            log_headers: self.log_headers,
            skip_paths: self.skip_paths.clone(),
            ..Default::default()
        })
    }
}

fn default_body_limit() -> usize {
    4 * 1024 * 1024 // 4 MB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.body_limit, 4 * 1024 * 1024);
        assert_eq!(config.server.read_timeout, Duration::from_secs(30));
        assert!(config.cors.is_none());
        assert!(config.csrf.is_none());
        assert!(config.middleware.recover);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_listen_addr() {
        let mut server = ServerConfig::default();
        assert_eq!(server.listen_addr().unwrap().port(), 8080);

        server.listen = "localhost".to_string();
        assert!(server.listen_addr().is_err());
    }

    #[test]
    fn test_api_key_entry() {
        let entry = ApiKeyEntry {
            id: "ci".to_string(),
            key: "k-123".to_string(),
            owner: "ci-bot".to_string(),
            scopes: vec!["builds:write".to_string()],
        };
        let key = ApiKey::from(&entry);
        assert_eq!(key.owner, "ci-bot");
        assert_eq!(key.scopes, vec!["builds:write"]);
        assert!(key.is_valid());
    }

    #[test]
    fn test_request_logging_settings() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            skip_paths: vec!["/health".to_string()],
            ..Default::default()
        };
        let settings = logging.request_logging().unwrap();
        assert_eq!(settings.log_level, tracing::Level::DEBUG);
        assert_eq!(settings.skip_paths, vec!["/health"]);

        let bad = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(bad.request_logging().is_err());
    }
}
