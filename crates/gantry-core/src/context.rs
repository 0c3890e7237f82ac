//! Request context handed to middleware and handlers
//!
//! [`Context`] owns everything known about one request: method, URI,
//! headers, the fully read body, matched route parameters, and the
//! request-scoped [`Locals`]. It also carries the pending response status and
//! headers that the terminal methods (`json`, `text`, `redirect`, ...) turn
//! into a [`Response`].
//!
//! The runtime builds a `Context` from whatever the HTTP engine hands it, so
//! code written against `Context` never sees engine types.

use crate::cookie::{parse_cookie_header, Cookie};
use crate::locals::{keys, AsLocalKey, Locals};
use crate::response::{Body, ResponseBuilder};
use crate::types::Principal;
use crate::validation::Validate;
use crate::error::ErrorRenderer;
use crate::{Error, Result};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Status and headers accumulated before a terminal call
#[derive(Debug, Clone)]
struct PendingResponse {
    status: StatusCode,
    headers: HeaderMap,
}

impl Default for PendingResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Request-scoped context
#[derive(Debug, Clone)]
pub struct Context {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    route_pattern: Option<String>,
    remote_addr: Option<SocketAddr>,
    trust_proxy: bool,
    locals: Locals,
    pending: PendingResponse,
}

impl Context {
    /// Build a context from request parts and a fully read body
    pub fn new(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            route_pattern: None,
            remote_addr: None,
            trust_proxy: false,
            locals: Locals::new(),
            pending: PendingResponse::default(),
        }
    }

    /// Build a context from a buffered request
    pub fn from_request(req: Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }

    /// Attach the peer address
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Honour `X-Forwarded-*` headers in `ip()` and `protocol()`
    pub fn with_trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    /// Record the matched route pattern and its parameters
    pub fn set_route(&mut self, pattern: impl Into<String>, params: HashMap<String, String>) {
        self.route_pattern = Some(pattern.into());
        self.params = params;
    }

    // --- request data ---

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path, without query string
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Full request URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path plus query string as sent by the client
    pub fn original_url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// `http` or `https`
    pub fn protocol(&self) -> &str {
        if self.trust_proxy {
            if let Some(proto) = self.header("x-forwarded-proto") {
                return proto.split(',').next().unwrap_or("http").trim();
            }
        }
        self.uri.scheme_str().unwrap_or("http")
    }

    /// Client address
    pub fn ip(&self) -> Option<IpAddr> {
        if self.trust_proxy {
            let forwarded = self
                .header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        self.remote_addr.map(|addr| addr.ip())
    }

    /// Host name without port
    pub fn hostname(&self) -> Option<&str> {
        let host = self
            .header(header::HOST.as_str())
            .or_else(|| self.uri.host())?;

        if host.starts_with('[') {
            // IPv6 literal
            return host.split_inclusive(']').next();
        }
        Some(host.split(':').next().unwrap_or(host))
    }

    /// Header value, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Route parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All route parameters
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Pattern of the matched route
    pub fn route_pattern(&self) -> Option<&str> {
        self.route_pattern.as_deref()
    }

    /// Percent-decoded query parameter; the first value wins for repeated keys
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// All query parameters
    pub fn queries(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        if let Some(query) = self.uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                out.entry(key.into_owned()).or_insert_with(|| value.into_owned());
            }
        }
        out
    }

    /// Request cookie
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Raw body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text
    pub fn body_string(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| Error::InvalidRequest(format!("body is not valid UTF-8: {e}")))
    }

    /// Decode a JSON body
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(Error::InvalidRequest("empty body".to_string()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::InvalidRequest(format!("invalid JSON body: {e}")))
    }

    /// Decode a JSON body and validate it
    pub fn bind<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let value: T = self.body_json()?;
        value.validate()?;
        Ok(value)
    }

    // --- locals ---

    /// Request-scoped store
    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    /// Mutable request-scoped store
    pub fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }

    /// Typed local value
    pub fn local<T: Any + Send + Sync>(&self, key: impl AsLocalKey) -> Option<&T> {
        self.locals.get(key)
    }

    /// Set a local value
    pub fn set_local<T: Any + Send + Sync>(&mut self, key: impl AsLocalKey, value: T) {
        self.locals.insert(key, value);
    }

    /// Authenticated principal, if any middleware set one
    pub fn principal(&self) -> Option<&Principal> {
        self.locals.get(keys::PRINCIPAL)
    }

    /// Request id, if the request id middleware ran
    pub fn request_id(&self) -> Option<&str> {
        self.locals
            .get::<String>(keys::REQUEST_ID)
            .map(String::as_str)
    }

    /// Renderer for errors that must become a response before reaching the server
    pub fn error_renderer(&self) -> ErrorRenderer {
        self.locals
            .get::<ErrorRenderer>(keys::ERROR_RENDERER)
            .cloned()
            .unwrap_or_default()
    }

    // --- response building ---

    /// Set the response status
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.pending.status = status;
        self
    }

    /// Set a response header, replacing previous values
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let (name, value) = header_pair(name, value)?;
        self.pending.headers.insert(name, value);
        Ok(self)
    }

    /// Append a response header
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let (name, value) = header_pair(name, value)?;
        self.pending.headers.append(name, value);
        Ok(self)
    }

    /// Add a `Set-Cookie` header
    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<&mut Self> {
        cookie.validate()?;
        let value = HeaderValue::from_str(&cookie.to_header_value())
            .map_err(|e| Error::InvalidRequest(format!("invalid cookie: {e}")))?;
        self.pending.headers.append(header::SET_COOKIE, value);
        Ok(self)
    }

    /// Expire a cookie on the client
    pub fn clear_cookie(&mut self, name: &str) -> Result<&mut Self> {
        self.set_cookie(&Cookie::expired(name))
    }

    fn take_builder(&mut self) -> ResponseBuilder {
        let pending = std::mem::take(&mut self.pending);
        ResponseBuilder::with_headers(pending.status, pending.headers)
    }

    /// Respond with JSON
    pub fn json<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<Response<Body>> {
        self.take_builder().json_body(body)
    }

    /// Respond with plain text
    pub fn text(&mut self, body: impl Into<String>) -> Result<Response<Body>> {
        self.take_builder().text(body)
    }

    /// Respond with HTML
    pub fn html(&mut self, body: impl Into<String>) -> Result<Response<Body>> {
        self.take_builder().html(body)
    }

    /// Respond with raw bytes
    pub fn send(&mut self, body: impl Into<Bytes>) -> Result<Response<Body>> {
        self.take_builder().bytes(body)
    }

    /// Respond with a status and its canonical reason as the body
    pub fn send_status(&mut self, status: StatusCode) -> Result<Response<Body>> {
        self.status(status);
        self.take_builder()
            .text(status.canonical_reason().unwrap_or_default())
    }

    /// Respond 204 with no body
    pub fn no_content(&mut self) -> Result<Response<Body>> {
        self.status(StatusCode::NO_CONTENT);
        self.take_builder().build()
    }

    /// Redirect with 302 Found
    pub fn redirect(&mut self, location: &str) -> Result<Response<Body>> {
        self.redirect_with(location, StatusCode::FOUND)
    }

    /// Redirect with an explicit 3xx status
    pub fn redirect_with(&mut self, location: &str, status: StatusCode) -> Result<Response<Body>> {
        if !status.is_redirection() {
            return Err(Error::Internal(format!(
                "redirect status must be 3xx, got {status}"
            )));
        }
        self.status(status);
        self.set_header(header::LOCATION.as_str(), location)?;
        self.take_builder().build()
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::InvalidRequest(format!("invalid header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidRequest(format!("invalid header value: {e}")))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locals::LocalKey;
    use crate::validation::Validator;
    use serde::Deserialize;

    fn ctx(req: http::request::Builder, body: &'static str) -> Context {
        Context::from_request(req.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[test]
    fn test_request_accessors() {
        let c = ctx(
            Request::builder()
                .method(Method::POST)
                .uri("/search?q=rust%20lang&page=2&q=second")
                .header("Host", "api.example.com:8443")
                .header("X-Custom", "yes"),
            "",
        );

        assert_eq!(c.method(), Method::POST);
        assert_eq!(c.path(), "/search");
        assert_eq!(c.original_url(), "/search?q=rust%20lang&page=2&q=second");
        assert_eq!(c.query("q").as_deref(), Some("rust lang"));
        assert_eq!(c.queries().get("q").map(String::as_str), Some("rust lang"));
        assert_eq!(c.query("page").as_deref(), Some("2"));
        assert!(c.query("missing").is_none());
        assert_eq!(c.hostname(), Some("api.example.com"));
        assert_eq!(c.header("x-custom"), Some("yes"));
        assert_eq!(c.protocol(), "http");
    }

    #[test]
    fn test_ipv6_hostname() {
        let c = ctx(Request::builder().uri("/").header("Host", "[::1]:8080"), "");
        assert_eq!(c.hostname(), Some("[::1]"));
    }

    #[test]
    fn test_ip_and_proxy_headers() {
        let addr: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        let req = || {
            Request::builder()
                .uri("/")
                .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
                .header("X-Forwarded-Proto", "https")
        };

        let direct = ctx(req(), "").with_remote_addr(addr);
        assert_eq!(direct.ip(), Some(addr.ip()));
        assert_eq!(direct.protocol(), "http");

        let proxied = ctx(req(), "").with_remote_addr(addr).with_trust_proxy(true);
        assert_eq!(proxied.ip(), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(proxied.protocol(), "https");
    }

    #[test]
    fn test_cookies() {
        let c = ctx(
            Request::builder()
                .uri("/")
                .header("Cookie", "session=abc; theme=dark"),
            "",
        );
        assert_eq!(c.cookie("theme"), Some("dark"));
        assert_eq!(c.cookie("session"), Some("abc"));
        assert!(c.cookie("other").is_none());
    }

    #[derive(Debug, Deserialize)]
    struct NewUser {
        email: String,
        name: String,
    }

    impl Validate for NewUser {
        fn validate(&self) -> Result<()> {
            Validator::new()
                .field("email", &self.email, "required,email")
                .field("name", &self.name, "required,min=2")
                .finish()
        }
    }

    #[test]
    fn test_body_json_and_bind() {
        let ok = ctx(
            Request::builder().uri("/"),
            r#"{"email":"a@b.io","name":"Al"}"#,
        );
        let user: NewUser = ok.bind().unwrap();
        assert_eq!(user.name, "Al");

        let empty = ctx(Request::builder().uri("/"), "");
        assert!(matches!(
            empty.body_json::<NewUser>(),
            Err(Error::InvalidRequest(_))
        ));

        let malformed = ctx(Request::builder().uri("/"), "{not json");
        assert!(matches!(
            malformed.body_json::<NewUser>(),
            Err(Error::InvalidRequest(_))
        ));

        let invalid = ctx(Request::builder().uri("/"), r#"{"email":"nope","name":"A"}"#);
        match invalid.bind::<NewUser>() {
            Err(Error::Validation(errors)) => assert_eq!(errors.fields().len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_route_params() {
        let mut c = ctx(Request::builder().uri("/users/42"), "");
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        c.set_route("/users/:id", params);

        assert_eq!(c.param("id"), Some("42"));
        assert_eq!(c.route_pattern(), Some("/users/:id"));
    }

    #[test]
    fn test_locals_and_principal() {
        let mut c = ctx(Request::builder().uri("/"), "");
        assert!(c.principal().is_none());

        c.set_local(keys::PRINCIPAL, Principal::new("u1", "test"));
        c.set_local(LocalKey::app("tenant").unwrap(), "acme".to_string());

        assert_eq!(c.principal().unwrap().subject, "u1");
        assert_eq!(
            c.local::<String>(LocalKey::app("tenant").unwrap()).unwrap(),
            "acme"
        );
    }

    #[test]
    fn test_response_building() {
        let mut c = ctx(Request::builder().uri("/"), "");
        let response = c
            .status(StatusCode::CREATED)
            .set_header("X-Trace", "t-1")
            .unwrap()
            .json(&serde_json::json!({ "id": 1 }))
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("x-trace").unwrap(), "t-1");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        // pending state is consumed by the terminal call
        let next = c.text("again").unwrap();
        assert_eq!(next.status(), StatusCode::OK);
        assert!(next.headers().get("x-trace").is_none());
    }

    #[test]
    fn test_invalid_headers_rejected() {
        let mut c = ctx(Request::builder().uri("/"), "");

        let err = c.set_header("bad header", "v").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = c.set_header("X-Ok", "a\nb").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = c.append_header("X-Ok", "a\rb").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let response = c.no_content().unwrap();
        assert!(response.headers().get("x-ok").is_none());
    }

    #[test]
    fn test_append_header_keeps_values() {
        let mut c = ctx(Request::builder().uri("/"), "");
        c.append_header("X-Tag", "a").unwrap();
        c.append_header("X-Tag", "b").unwrap();
        let response = c.text("ok").unwrap();

        let tags: Vec<_> = response
            .headers()
            .get_all("x-tag")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["a", "b"]);

        let mut c = ctx(Request::builder().uri("/"), "");
        c.append_header("X-Tag", "a").unwrap();
        c.set_header("X-Tag", "z").unwrap();
        let response = c.text("ok").unwrap();
        assert_eq!(response.headers().get_all("x-tag").iter().count(), 1);
        assert_eq!(response.headers().get("x-tag").unwrap(), "z");
    }

    #[tokio::test]
    async fn test_html_response() {
        let mut c = ctx(Request::builder().uri("/"), "");
        let response = c.html("<h1>hi</h1>").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"<h1>hi</h1>");
    }

    #[test]
    fn test_set_cookie_rejects_injection() {
        let mut c = ctx(Request::builder().uri("/"), "");
        let err = c
            .set_cookie(&Cookie::new("id", "1; Max-Age=999999"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let response = c.no_content().unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_cookies_on_response() {
        let mut c = ctx(Request::builder().uri("/"), "");
        c.set_cookie(&Cookie::new("a", "1")).unwrap();
        c.clear_cookie("b").unwrap();
        let response = c.no_content().unwrap();

        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, vec!["a=1; Path=/", "b=; Path=/; Max-Age=0"]);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_redirect() {
        let mut c = ctx(Request::builder().uri("/"), "");
        let response = c.redirect("/login").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");

        let permanent = c
            .redirect_with("/new", StatusCode::MOVED_PERMANENTLY)
            .unwrap();
        assert_eq!(permanent.status(), StatusCode::MOVED_PERMANENTLY);

        assert!(c.redirect_with("/x", StatusCode::OK).is_err());
    }

    #[test]
    fn test_send_status() {
        let mut c = ctx(Request::builder().uri("/"), "");
        let response = c.send_status(StatusCode::ACCEPTED).unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
