//! Request logging middleware

use async_trait::async_trait;
use gantry_core::{keys, Body, Context, Middleware, Next, Result};
use http::Response;
use std::fmt;
use std::time::Instant;
use tracing::Level;

/// Request logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for successful requests; 5xx and failures always log at WARN or above
    pub log_level: Level,
    /// Whether to log request headers
    pub log_headers: bool,
    /// Headers to redact (e.g., Authorization, Cookie)
    pub sensitive_headers: Vec<String>,
    /// Paths that are not logged (health checks and the like)
    pub skip_paths: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            log_headers: false,
            sensitive_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
                "x-csrf-token".to_string(),
            ],
            skip_paths: Vec::new(),
        }
    }
}

// `tracing` needs the level at compile time
macro_rules! event_at {
    ($level:expr, $($args:tt)+) => {
        match $level {
            Level::TRACE => tracing::trace!($($args)+),
            Level::DEBUG => tracing::debug!($($args)+),
            Level::INFO => tracing::info!($($args)+),
            Level::WARN => tracing::warn!($($args)+),
            _ => tracing::error!($($args)+),
        }
    };
}

/// Request logging middleware
///
/// Emits one structured event per request once the response is known:
/// method, path, status, latency, and request id.
#[derive(Clone)]
pub struct RequestLogger {
    config: LoggingConfig,
}

impl RequestLogger {
    /// Create a new RequestLogger with default config
    pub fn new() -> Self {
        Self::with_config(LoggingConfig::default())
    }

    /// Create a new RequestLogger with custom config
    pub fn with_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    fn should_redact(&self, header_name: &str) -> bool {
        self.config
            .sensitive_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(header_name))
    }

    /// Header value as it may appear in logs
    pub fn redact_value<'a>(&self, header_name: &str, value: &'a str) -> &'a str {
        if self.should_redact(header_name) {
            "[REDACTED]"
        } else {
            value
        }
    }

    fn header_list(&self, ctx: &Context) -> Vec<String> {
        ctx.headers()
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("[invalid UTF-8]");
                format!("{}: {}", name, self.redact_value(name.as_str(), value))
            })
            .collect()
    }
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("log_level", &self.config.log_level)
            .field("log_headers", &self.config.log_headers)
            .finish()
    }
}

#[async_trait]
impl Middleware for RequestLogger {
    async fn call(&self, mut ctx: Context, next: Next) -> Result<Response<Body>> {
        if self.config.skip_paths.iter().any(|p| p == ctx.path()) {
            return next.run(ctx).await;
        }

        let start = Instant::now();
        ctx.set_local(keys::START_TIME, start);

        let method = ctx.method().clone();
        let path = ctx.path().to_string();
        let request_id = ctx.request_id().unwrap_or("-").to_string();

        if self.config.log_headers {
            let headers = self.header_list(&ctx);
            event_at!(
                self.config.log_level,
                method = %method,
                path = %path,
                request_id = %request_id,
                headers = ?headers,
                "Incoming request"
            );
        }

        let result = next.run(ctx).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let status = response.status();
                let level = if status.is_server_error() {
                    Level::WARN
                } else {
                    self.config.log_level
                };
                event_at!(
                    level,
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    latency_ms,
                    request_id = %request_id,
                    "Request completed"
                );
            }
            Err(e) => {
                let status = e.to_status_code();
                if status.is_server_error() {
                    tracing::error!(
                        method = %method,
                        path = %path,
                        status = status.as_u16(),
                        latency_ms,
                        request_id = %request_id,
                        error = %e,
                        "Request failed"
                    );
                } else {
                    event_at!(
                        self.config.log_level,
                        method = %method,
                        path = %path,
                        status = status.as_u16(),
                        latency_ms,
                        request_id = %request_id,
                        error = %e,
                        "Request rejected"
                    );
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gantry_core::{handler, Error, MiddlewareStack};
    use http::{Request, StatusCode};
    use std::sync::Arc;

    fn stack(logger: RequestLogger) -> MiddlewareStack {
        Arc::new([Arc::new(logger) as Arc<dyn Middleware>])
    }

    fn request(path: &str) -> Context {
        Context::from_request(
            Request::builder()
                .uri(path)
                .header("Authorization", "Bearer secret")
                .body(Bytes::new())
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_request_logging_records_start_time() {
        let h = handler(|mut ctx: Context| async move {
            assert!(ctx.local::<Instant>(keys::START_TIME).is_some());
            ctx.send_status(StatusCode::OK)
        });

        let logger = RequestLogger::with_config(LoggingConfig {
            log_headers: true,
            log_level: Level::DEBUG,
            ..Default::default()
        });
        let response = Next::with_handler(stack(logger), h)
            .run(request("/test"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_sensitive_header_redaction() {
        let logger = RequestLogger::new();

        assert_eq!(logger.redact_value("Authorization", "Bearer token123"), "[REDACTED]");
        assert_eq!(logger.redact_value("Cookie", "session=abc"), "[REDACTED]");
        assert_eq!(
            logger.redact_value("Content-Type", "application/json"),
            "application/json"
        );

        let headers = logger.header_list(&request("/"));
        assert_eq!(headers, vec!["authorization: [REDACTED]".to_string()]);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let h = handler(|_ctx: Context| async move {
            Err::<Response<Body>, _>(Error::Internal("Test error".to_string()))
        });

        let result = Next::with_handler(stack(RequestLogger::new()), h)
            .run(request("/test"))
            .await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_skip_paths() {
        let logger = RequestLogger::with_config(LoggingConfig {
            skip_paths: vec!["/health".to_string()],
            ..Default::default()
        });
        let h = handler(|mut ctx: Context| async move {
            // skipped requests are not timed
            let timed = ctx.local::<Instant>(keys::START_TIME).is_some();
            ctx.text(timed.to_string())
        });

        let response = Next::with_handler(stack(logger), h)
            .run(request("/health"))
            .await
            .unwrap();
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"false");
    }
}
