//! Configuration builder

use crate::types::{ApiKeyEntry, Config, LoggingConfig};
use crate::validator::validate_config;
use gantry_auth::JwtConfig;
use gantry_core::Result;
use gantry_middleware::{CorsConfig, CsrfConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// Builder for constructing configuration programmatically
///
/// Starts from [`Config::default`]; [`ConfigBuilder::build`] validates the
/// result the same way file-based configuration is validated.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Set listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.config.server.listen = addr.to_string();
        self
    }

    /// Set application name
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.server.app_name = name.into();
        self
    }

    /// Set max request body size
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.config.server.body_limit = bytes;
        self
    }

    /// Set the handler deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.write_timeout = timeout;
        self
    }

    /// Set the graceful shutdown window
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.shutdown_timeout = timeout;
        self
    }

    /// Trust `X-Forwarded-*` headers
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.config.server.trust_proxy = trust;
        self
    }

    /// Treat paths case-sensitively
    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.config.server.case_sensitive = enabled;
        self
    }

    /// Make trailing slashes significant
    pub fn strict_routing(mut self, enabled: bool) -> Self {
        self.config.server.strict_routing = enabled;
        self
    }

    /// Enable server-wide CORS
    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = Some(cors);
        self
    }

    /// Enable CSRF protection
    pub fn csrf(mut self, csrf: CsrfConfig) -> Self {
        self.config.csrf = Some(csrf);
        self
    }

    /// Enable JWT authentication
    pub fn jwt(mut self, jwt: JwtConfig) -> Self {
        self.config.auth.jwt = Some(jwt);
        self
    }

    /// Add a static API key
    pub fn api_key(mut self, entry: ApiKeyEntry) -> Self {
        self.config.auth.api_keys.push(entry);
        self
    }

    /// Set logging configuration
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        validate_config(&self.config)?;
        Ok(self.config)
    }
}
