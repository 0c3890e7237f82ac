//! Timeout middleware

use async_trait::async_trait;
use gantry_core::{Body, Context, Error, Middleware, Next, Result};
use http::Response;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;

/// Default deadline for the downstream chain
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout middleware
///
/// Cancels the downstream chain once it runs past the deadline and fails
/// with [`Error::Timeout`], which renders as 503 Service Unavailable.
#[derive(Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Create a new Timeout middleware with the default 30s deadline
    pub fn new() -> Self {
        Self::with_duration(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new Timeout middleware with a specific duration
    pub fn with_duration(duration: Duration) -> Self {
        Self { duration }
    }

    /// Configured deadline
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("request_timeout", &self.duration)
            .finish()
    }
}

#[async_trait]
impl Middleware for Timeout {
    async fn call(&self, ctx: Context, next: Next) -> Result<Response<Body>> {
        let path = ctx.path().to_string();
        match timeout(self.duration, next.run(ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    path = %path,
                    timeout_ms = self.duration.as_millis() as u64,
                    "Request timeout"
                );
                Err(Error::Timeout)
            }
        }
    }
}
