//! CSRF protection using the double-submit cookie pattern
//!
//! Safe requests receive a random token in a cookie. Unsafe requests must
//! echo that token in a header; a cross-site page can make the browser send
//! the cookie but cannot read it to fill in the header.

use async_trait::async_trait;
use gantry_core::{keys, Body, Context, Cookie, Error, Middleware, Next, Result, SameSite};
use http::{header, HeaderName, HeaderValue, Method, Response};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Shortest accepted token length
pub const MIN_TOKEN_LENGTH: usize = 16;

/// CSRF configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Name of the token cookie
    pub cookie_name: String,
    /// Cookie path
    pub cookie_path: String,
    /// Cookie domain
    pub cookie_domain: Option<String>,
    /// Mark the cookie `Secure`
    pub cookie_secure: bool,
    /// Mark the cookie `HttpOnly` (scripts then cannot copy it into the header)
    pub cookie_http_only: bool,
    /// `SameSite` attribute
    pub cookie_same_site: SameSite,
    /// Cookie lifetime
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
    /// Header carrying the token on unsafe requests
    pub header_name: String,
    /// Paths that bypass the check; a trailing `*` matches a prefix
    pub skip_paths: Vec<String>,
    /// Generated token length
    pub token_length: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf_token".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            cookie_secure: false,
            cookie_http_only: false,
            cookie_same_site: SameSite::Lax,
            expiration: Duration::from_secs(24 * 60 * 60),
            header_name: "X-CSRF-Token".to_string(),
            skip_paths: Vec::new(),
            token_length: 32,
        }
    }
}

impl CsrfConfig {
    /// Check names and cookie attributes
    pub fn validate(&self) -> Result<()> {
        let cookie_name_ok = !self.cookie_name.is_empty()
            && self
                .cookie_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"-_.".contains(&b));
        if !cookie_name_ok {
            return Err(Error::Config(format!(
                "csrf: invalid cookie_name '{}'",
                self.cookie_name
            )));
        }

        if self.header_name.is_empty()
            || HeaderName::from_bytes(self.header_name.as_bytes()).is_err()
        {
            return Err(Error::Config(format!(
                "csrf: invalid header_name '{}'",
                self.header_name
            )));
        }

        if !self.cookie_path.starts_with('/') {
            return Err(Error::Config("csrf: cookie_path must start with '/'".to_string()));
        }

        if self.cookie_same_site == SameSite::None && !self.cookie_secure {
            return Err(Error::Config(
                "csrf: SameSite=None requires cookie_secure".to_string(),
            ));
        }

        if self.expiration.is_zero() {
            return Err(Error::Config("csrf: expiration must be > 0".to_string()));
        }

        if self.token_length < MIN_TOKEN_LENGTH {
            return Err(Error::Config(format!(
                "csrf: token_length must be at least {MIN_TOKEN_LENGTH}"
            )));
        }

        Ok(())
    }
}

/// CSRF middleware
#[derive(Clone)]
pub struct Csrf {
    config: CsrfConfig,
}

impl Csrf {
    /// CSRF middleware with default config
    pub fn new() -> Self {
        Self::with_config(CsrfConfig::default())
    }

    /// CSRF middleware with custom config
    pub fn with_config(config: CsrfConfig) -> Self {
        Self { config }
    }

    fn should_skip(&self, path: &str) -> bool {
        self.config.skip_paths.iter().any(|skip| match skip.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == skip,
        })
    }

    fn generate_token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.config.token_length)
            .map(char::from)
            .collect()
    }

    fn cookie(&self, token: &str) -> Cookie {
        let mut cookie = Cookie::new(&self.config.cookie_name, token)
            .path(&self.config.cookie_path)
            .max_age(self.config.expiration)
            .secure(self.config.cookie_secure)
            .http_only(self.config.cookie_http_only)
            .same_site(self.config.cookie_same_site);
        if let Some(ref domain) = self.config.cookie_domain {
            cookie = cookie.domain(domain);
        }
        cookie
    }
}

impl Default for Csrf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Csrf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Csrf")
            .field("cookie_name", &self.config.cookie_name)
            .field("header_name", &self.config.header_name)
            .field("skip_paths", &self.config.skip_paths)
            .finish()
    }
}

/// Methods that must not change state
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

// Runs in time independent of where the inputs first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
impl Middleware for Csrf {
    async fn call(&self, mut ctx: Context, next: Next) -> Result<Response<Body>> {
        if self.should_skip(ctx.path()) {
            return next.run(ctx).await;
        }

        let existing = ctx
            .cookie(&self.config.cookie_name)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        if is_safe_method(ctx.method()) {
            let (token, issued) = match existing {
                Some(token) => (token, false),
                None => (self.generate_token(), true),
            };
            ctx.set_local(keys::CSRF_TOKEN, token.clone());

            // A failed safe request still hands out the token
            let renderer = ctx.error_renderer();
            let mut response = next
                .run(ctx)
                .await
                .unwrap_or_else(|e| renderer.render(&e));
            if issued {
                let value = HeaderValue::from_str(&self.cookie(&token).to_header_value())
                    .map_err(|e| Error::Internal(format!("csrf cookie: {e}")))?;
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            return Ok(response);
        }

        let Some(cookie_token) = existing else {
            tracing::debug!(path = %ctx.path(), "CSRF cookie missing");
            return Err(Error::Csrf("missing token cookie".to_string()));
        };
        let Some(header_token) = ctx.header(&self.config.header_name) else {
            tracing::debug!(path = %ctx.path(), "CSRF header missing");
            return Err(Error::Csrf("missing token header".to_string()));
        };
        if !constant_time_eq(cookie_token.as_bytes(), header_token.as_bytes()) {
            tracing::warn!(path = %ctx.path(), method = %ctx.method(), "CSRF token mismatch");
            return Err(Error::Csrf("token mismatch".to_string()));
        }

        ctx.set_local(keys::CSRF_TOKEN, cookie_token);
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gantry_core::{handler, MiddlewareStack};
    use http::{Request, StatusCode};
    use std::sync::Arc;

    async fn run(csrf: Csrf, req: http::request::Builder) -> Result<Response<Body>> {
        let stack: MiddlewareStack = Arc::new([Arc::new(csrf) as Arc<dyn Middleware>]);
        let h = handler(|mut ctx: Context| async move {
            let token = ctx
                .local::<String>(keys::CSRF_TOKEN)
                .cloned()
                .unwrap_or_default();
            ctx.text(token)
        });
        let ctx = Context::from_request(req.body(Bytes::new()).unwrap());
        Next::with_handler(stack, h).run(ctx).await
    }

    fn set_cookie(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_safe_request_issues_token() {
        let response = run(Csrf::new(), Request::builder().uri("/form")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = set_cookie(&response).unwrap();
        assert!(cookie.starts_with("csrf_token="));
        assert!(cookie.contains("SameSite=Lax"));

        let token = cookie["csrf_token=".len()..].split(';').next().unwrap();
        assert_eq!(token.len(), 32);

        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], token.as_bytes());
    }

    #[tokio::test]
    async fn test_safe_request_error_still_issues_token() {
        let stack: MiddlewareStack = Arc::new([Arc::new(Csrf::new()) as Arc<dyn Middleware>]);
        let h = handler(|ctx: Context| async move {
            Err::<Response<Body>, _>(Error::RouteNotFound(ctx.path().to_string()))
        });
        let ctx = Context::from_request(Request::builder().uri("/gone").body(Bytes::new()).unwrap());

        let response = Next::with_handler(stack, h).run(ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(set_cookie(&response).unwrap().starts_with("csrf_token="));
    }

    #[tokio::test]
    async fn test_safe_request_reuses_cookie() {
        let req = Request::builder()
            .uri("/form")
            .header(header::COOKIE, "csrf_token=existing-token-value-0001");
        let response = run(Csrf::new(), req).await.unwrap();
        assert!(set_cookie(&response).is_none());
    }

    #[tokio::test]
    async fn test_unsafe_request_checks_header() {
        let token = "abcdefghijklmnopqrstuvwxyz012345";
        let ok = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(header::COOKIE, format!("csrf_token={token}"))
            .header("X-CSRF-Token", token);
        assert_eq!(run(Csrf::new(), ok).await.unwrap().status(), StatusCode::OK);

        let mismatch = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(header::COOKIE, format!("csrf_token={token}"))
            .header("X-CSRF-Token", "abcdefghijklmnopqrstuvwxyz012346");
        assert!(matches!(run(Csrf::new(), mismatch).await, Err(Error::Csrf(_))));

        let no_header = Request::builder()
            .method(Method::DELETE)
            .uri("/submit")
            .header(header::COOKIE, format!("csrf_token={token}"));
        let err = run(Csrf::new(), no_header).await.unwrap_err();
        assert_eq!(err.to_status_code(), StatusCode::FORBIDDEN);

        let no_cookie = Request::builder()
            .method(Method::PUT)
            .uri("/submit")
            .header("X-CSRF-Token", token);
        assert!(run(Csrf::new(), no_cookie).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_paths() {
        let csrf = Csrf::with_config(CsrfConfig {
            skip_paths: vec!["/webhooks/*".to_string(), "/login".to_string()],
            ..Default::default()
        });

        let hook = Request::builder().method(Method::POST).uri("/webhooks/stripe");
        assert!(run(csrf.clone(), hook).await.is_ok());

        let login = Request::builder().method(Method::POST).uri("/login");
        assert!(run(csrf.clone(), login).await.is_ok());

        let other = Request::builder().method(Method::POST).uri("/login/extra");
        assert!(run(csrf, other).await.is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_config_validation() {
        assert!(CsrfConfig::default().validate().is_ok());

        let none_insecure = CsrfConfig {
            cookie_same_site: SameSite::None,
            ..Default::default()
        };
        assert!(none_insecure.validate().is_err());

        let none_secure = CsrfConfig {
            cookie_same_site: SameSite::None,
            cookie_secure: true,
            ..Default::default()
        };
        assert!(none_secure.validate().is_ok());

        let empty_cookie = CsrfConfig {
            cookie_name: String::new(),
            ..Default::default()
        };
        assert!(empty_cookie.validate().is_err());

        let empty_header = CsrfConfig {
            header_name: String::new(),
            ..Default::default()
        };
        assert!(empty_header.validate().is_err());

        let short = CsrfConfig {
            token_length: 8,
            ..Default::default()
        };
        assert!(short.validate().is_err());
    }
}
