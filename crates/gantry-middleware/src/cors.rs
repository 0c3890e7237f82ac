//! CORS (Cross-Origin Resource Sharing) middleware

use async_trait::async_trait;
use gantry_core::{Body, Context, Error, Middleware, Next, ResponseBuilder, Result};
use http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest preflight cache browsers are asked to keep
pub const MAX_PREFLIGHT_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// CORS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins: `*`, exact origins, or `*.example.com` style suffix patterns
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed request headers; empty echoes what the browser asks for
    pub allowed_headers: Vec<String>,
    /// Headers exposed to the browser
    pub exposed_headers: Vec<String>,
    /// Max age for preflight cache
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// Whether to allow credentials (cookies, auth headers)
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Request-ID".to_string(),
                "X-CSRF-Token".to_string(),
            ],
            exposed_headers: vec!["Content-Length".to_string(), "X-Request-ID".to_string()],
            max_age: Duration::from_secs(3600),
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// Restrict to the given origins
    pub fn for_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Check the configuration for combinations browsers reject
    pub fn validate(&self) -> Result<()> {
        if self.allowed_origins.is_empty() {
            return Err(Error::Config(
                "cors: allowed_origins must not be empty".to_string(),
            ));
        }

        for origin in &self.allowed_origins {
            if origin.trim().is_empty() || origin.chars().any(char::is_whitespace) {
                return Err(Error::Config(format!("cors: invalid origin '{origin}'")));
            }
        }

        if self.allow_credentials && self.allowed_origins.iter().any(|o| o == "*") {
            return Err(Error::Config(
                "cors: allow_credentials cannot be combined with a '*' origin".to_string(),
            ));
        }

        for method in &self.allowed_methods {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| Error::Config(format!("cors: invalid method '{method}'")))?;
        }

        for name in self.allowed_headers.iter().chain(&self.exposed_headers) {
            header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::Config(format!("cors: invalid header name '{name}'")))?;
        }

        if self.max_age > MAX_PREFLIGHT_AGE {
            return Err(Error::Config(format!(
                "cors: max_age {:?} exceeds 24h",
                self.max_age
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginRule {
    Any,
    Exact(String),
    // `<prefix>*<suffix>`, suffix starts with '.'
    Wildcard { prefix: String, suffix: String },
}

impl OriginRule {
    fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            return Self::Any;
        }
        match pattern.find("*.") {
            Some(idx) => Self::Wildcard {
                prefix: pattern[..idx].to_ascii_lowercase(),
                suffix: pattern[idx + 1..].to_ascii_lowercase(),
            },
            None => Self::Exact(pattern.trim_end_matches('/').to_ascii_lowercase()),
        }
    }

    fn matches(&self, origin: &str) -> bool {
        let origin = origin.to_ascii_lowercase();
        match self {
            Self::Any => true,
            Self::Exact(allowed) => *allowed == origin,
            Self::Wildcard { prefix, suffix } => {
                // Without a scheme in the pattern, match on the host part only
                let target = if prefix.contains("://") {
                    origin.as_str()
                } else {
                    origin.split_once("://").map_or(origin.as_str(), |(_, host)| host)
                };
                target
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                    .is_some_and(|label| !label.is_empty() && !label.contains(['/', ':']))
            }
        }
    }
}

/// CORS middleware
///
/// Answers preflight requests itself and decorates every other response
/// with the CORS headers for allowed origins. Requests from origins that are
/// not allowed get no CORS headers at all.
#[derive(Clone)]
pub struct Cors {
    config: CorsConfig,
    rules: Vec<OriginRule>,
    allow_methods: String,
    allow_headers: String,
    expose_headers: String,
}

impl Cors {
    /// Create a new CORS middleware with default config (permissive)
    pub fn new() -> Self {
        Self::with_config(CorsConfig::default())
    }

    /// Create a new CORS middleware with custom config
    pub fn with_config(config: CorsConfig) -> Self {
        let rules = config
            .allowed_origins
            .iter()
            .map(|o| OriginRule::parse(o))
            .collect();
        let allow_methods = config
            .allowed_methods
            .iter()
            .map(|m| m.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            allow_headers: config.allowed_headers.join(", "),
            expose_headers: config.exposed_headers.join(", "),
            allow_methods,
            rules,
            config,
        }
    }

    /// Create a restrictive CORS middleware for specific origins
    pub fn for_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(CorsConfig::for_origins(origins))
    }

    /// Configuration in use
    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn is_wildcard_only(&self) -> bool {
        self.rules.iter().all(|r| *r == OriginRule::Any)
    }

    /// Check if origin is allowed
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(origin))
    }

    /// Value for Access-Control-Allow-Origin, or `None` when not allowed
    fn allow_origin(&self, origin: &str) -> Option<HeaderValue> {
        if !self.is_origin_allowed(origin) {
            return None;
        }
        if self.is_wildcard_only() && !self.config.allow_credentials {
            return Some(HeaderValue::from_static("*"));
        }
        HeaderValue::from_str(origin).ok()
    }

    fn set_common(&self, headers: &mut HeaderMap, allow_origin: HeaderValue) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if self.config.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    fn add_vary(&self, headers: &mut HeaderMap) {
        if self.is_wildcard_only() && !self.config.allow_credentials {
            return;
        }
        let present = headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| {
                let v = v.trim();
                v == "*" || v.eq_ignore_ascii_case("origin")
            });
        if !present {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }

    /// Handle preflight OPTIONS request
    fn preflight(&self, origin: &str, requested_headers: Option<String>) -> Result<Response<Body>> {
        let mut response = ResponseBuilder::new(StatusCode::NO_CONTENT).build()?;
        let headers = response.headers_mut();
        self.add_vary(headers);

        let Some(allow_origin) = self.allow_origin(origin) else {
            tracing::debug!(origin = %origin, "CORS preflight from disallowed origin");
            return Ok(response);
        };
        self.set_common(headers, allow_origin);

        if let Ok(methods) = HeaderValue::from_str(&self.allow_methods) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }

        let allow_headers = if self.config.allowed_headers.is_empty() {
            requested_headers
        } else {
            Some(self.allow_headers.clone())
        };
        if let Some(value) = allow_headers.and_then(|h| HeaderValue::from_str(&h).ok()) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }

        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from(self.config.max_age.as_secs()),
        );

        Ok(response)
    }

    /// Add CORS headers to an actual response
    fn decorate(&self, origin: &str, response: &mut Response<Body>) {
        let headers = response.headers_mut();
        self.add_vary(headers);

        let Some(allow_origin) = self.allow_origin(origin) else {
            return;
        };
        self.set_common(headers, allow_origin);

        if !self.expose_headers.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&self.expose_headers) {
                headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
            }
        }
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cors")
            .field("allowed_origins", &self.config.allowed_origins)
            .field("allow_credentials", &self.config.allow_credentials)
            .finish()
    }
}

/// Whether the request is a CORS preflight
pub fn is_preflight(ctx: &Context) -> bool {
    ctx.method() == Method::OPTIONS
        && ctx.header(header::ORIGIN.as_str()).is_some()
        && ctx
            .header(header::ACCESS_CONTROL_REQUEST_METHOD.as_str())
            .is_some()
}

#[async_trait]
impl Middleware for Cors {
    async fn call(&self, ctx: Context, next: Next) -> Result<Response<Body>> {
        let Some(origin) = ctx.header(header::ORIGIN.as_str()).map(str::to_string) else {
            // Same-origin or non-browser request
            return next.run(ctx).await;
        };

        if is_preflight(&ctx) {
            let requested = ctx
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS.as_str())
                .map(str::to_string);
            return self.preflight(&origin, requested);
        }

        // Errors still need CORS headers so browsers can read them
        let renderer = ctx.error_renderer();
        let mut response = match next.run(ctx).await {
            Ok(response) => response,
            Err(e) => renderer.render(&e),
        };
        self.decorate(&origin, &mut response);
        Ok(response)
    }
}
