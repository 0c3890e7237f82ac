//! Middleware chain builder

use crate::*;
use gantry_auth::{Authenticator, Authorizer, Permission};
use gantry_core::MiddlewareStack;
use std::sync::Arc;
use std::time::Duration;

/// Middleware chain builder
///
/// Middleware runs in the order it is added.
#[derive(Debug, Default)]
pub struct MiddlewareBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareBuilder {
    /// Create a new middleware builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add panic recovery
    #[must_use]
    pub fn with_recover(mut self) -> Self {
        self.middlewares.push(Arc::new(Recover::new()));
        self
    }

    /// Add Request ID middleware
    #[must_use]
    pub fn with_request_id(mut self) -> Self {
        self.middlewares.push(Arc::new(RequestId::new()));
        self
    }

    /// Add Request ID middleware with custom configuration
    #[must_use]
    pub fn with_request_id_config(mut self, config: RequestIdConfig) -> Self {
        self.middlewares
            .push(Arc::new(RequestId::with_config(config)));
        self
    }

    /// Add Timeout middleware with the default deadline
    #[must_use]
    pub fn with_timeout(mut self) -> Self {
        self.middlewares.push(Arc::new(Timeout::new()));
        self
    }

    /// Add Timeout middleware with custom duration
    #[must_use]
    pub fn with_timeout_duration(mut self, timeout: Duration) -> Self {
        self.middlewares
            .push(Arc::new(Timeout::with_duration(timeout)));
        self
    }

    /// Add Logging middleware
    #[must_use]
    pub fn with_logging(mut self) -> Self {
        self.middlewares.push(Arc::new(RequestLogger::new()));
        self
    }

    /// Add Logging middleware with custom configuration
    #[must_use]
    pub fn with_logging_config(mut self, config: LoggingConfig) -> Self {
        self.middlewares
            .push(Arc::new(RequestLogger::with_config(config)));
        self
    }

    /// Add CORS middleware
    #[must_use]
    pub fn with_cors(mut self) -> Self {
        self.middlewares.push(Arc::new(Cors::new()));
        self
    }

    /// Add CORS middleware with custom configuration
    #[must_use]
    pub fn with_cors_config(mut self, config: CorsConfig) -> Self {
        self.middlewares
            .push(Arc::new(Cors::with_config(config)));
        self
    }

    /// Add CSRF protection
    #[must_use]
    pub fn with_csrf(mut self) -> Self {
        self.middlewares.push(Arc::new(Csrf::new()));
        self
    }

    /// Add CSRF protection with custom configuration
    #[must_use]
    pub fn with_csrf_config(mut self, config: CsrfConfig) -> Self {
        self.middlewares.push(Arc::new(Csrf::with_config(config)));
        self
    }

    /// Require authentication
    #[must_use]
    pub fn with_authentication(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.middlewares
            .push(Arc::new(Authenticate::new(authenticator)));
        self
    }

    /// Require permissions; pair with [`Self::with_authentication`]
    #[must_use]
    pub fn with_authorization(
        mut self,
        authorizer: Arc<dyn Authorizer>,
        required: Vec<Permission>,
    ) -> Self {
        self.middlewares
            .push(Arc::new(Authorize::new(authorizer, required)));
        self
    }

    /// Add custom middleware
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Add several middleware
    #[must_use]
    pub fn extend<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.middlewares.extend(middlewares);
        self
    }

    /// Build the middleware chain
    #[must_use]
    pub fn build(self) -> MiddlewareStack {
        self.middlewares.into()
    }

    /// Get the number of middlewares in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}
