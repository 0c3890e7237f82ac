//! Request ID middleware for distributed tracing

use async_trait::async_trait;
use gantry_core::{keys, Body, Context, Middleware, Next, Result};
use http::{header::HeaderName, HeaderValue, Response};
use std::fmt;
use uuid::Uuid;

/// Longest incoming id that is trusted as-is
pub const MAX_INCOMING_ID_LEN: usize = 128;

/// Request ID generator strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGenerator {
    /// Generate UUID v4
    #[default]
    UuidV4,
    /// Millisecond timestamp prefix followed by random hex; sorts by creation time
    Timestamped,
}

impl IdGenerator {
    /// Generate a new ID
    pub fn generate(&self) -> String {
        match self {
            IdGenerator::UuidV4 => Uuid::new_v4().to_string(),
            IdGenerator::Timestamped => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or_default();
                format!("{:016x}{}", now, Uuid::new_v4().simple())
            }
        }
    }
}

/// Configuration for Request ID middleware
#[derive(Debug, Clone)]
pub struct RequestIdConfig {
    /// Header name for request ID
    pub header_name: String,
    /// ID generator strategy
    pub generator: IdGenerator,
    /// Whether to add request ID to response headers
    pub add_to_response: bool,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            header_name: "X-Request-ID".to_string(),
            generator: IdGenerator::UuidV4,
            add_to_response: true,
        }
    }
}

/// Request ID middleware
///
/// Honours an incoming id header when it looks sane, otherwise generates
/// one. The id is stored in the request locals and echoed on the response.
#[derive(Clone)]
pub struct RequestId {
    config: RequestIdConfig,
    header_name: HeaderName,
}

impl RequestId {
    /// Create a new Request ID middleware with default config
    pub fn new() -> Self {
        Self::with_config(RequestIdConfig::default())
    }

    /// Create a new Request ID middleware with custom config
    pub fn with_config(config: RequestIdConfig) -> Self {
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));

        Self {
            config,
            header_name,
        }
    }

    fn incoming(&self, ctx: &Context) -> Option<String> {
        ctx.header(self.header_name.as_str())
            .map(str::trim)
            .filter(|id| {
                !id.is_empty()
                    && id.len() <= MAX_INCOMING_ID_LEN
                    && id.bytes().all(|b| b.is_ascii_graphic())
            })
            .map(str::to_string)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestId")
            .field("header_name", &self.config.header_name)
            .field("generator", &self.config.generator)
            .finish()
    }
}

#[async_trait]
impl Middleware for RequestId {
    async fn call(&self, mut ctx: Context, next: Next) -> Result<Response<Body>> {
        let request_id = self
            .incoming(&ctx)
            .unwrap_or_else(|| self.config.generator.generate());

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            ctx.headers_mut().insert(self.header_name.clone(), value);
        }
        ctx.set_local(keys::REQUEST_ID, request_id.clone());

        let renderer = ctx.error_renderer();
        let result = next.run(ctx).await;
        if !self.config.add_to_response {
            return result;
        }

        // Failed requests carry the id too, so clients can quote it
        let mut response = result.unwrap_or_else(|e| {
            tracing::debug!(request_id = %request_id, error = %e, "Rendering error response");
            renderer.render(&e)
        });
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(self.header_name.clone(), value);
        }
        Ok(response)
    }
}
