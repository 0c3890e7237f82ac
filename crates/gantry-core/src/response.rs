//! Response builder and utilities

use crate::{Error, Result};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

/// Body type alias
pub type Body = Full<Bytes>;

/// Response builder for convenient response construction
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    /// Create a new response builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Create a builder that starts from already collected headers
    pub fn with_headers(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    /// Set a header, replacing any previous value
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a header from strings, validating both parts
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("invalid header value: {e}")))?;
        Ok(self.header(name, value))
    }

    /// Build response with empty body
    pub fn build(self) -> Result<Response<Body>> {
        self.finish(None, Bytes::new())
    }

    /// Build response with text body
    pub fn text(self, body: impl Into<String>) -> Result<Response<Body>> {
        self.finish(
            Some("text/plain; charset=utf-8"),
            Bytes::from(body.into()),
        )
    }

    /// Build response with HTML body
    pub fn html(self, body: impl Into<String>) -> Result<Response<Body>> {
        self.finish(Some("text/html; charset=utf-8"), Bytes::from(body.into()))
    }

    /// Build response with raw bytes
    pub fn bytes(self, body: impl Into<Bytes>) -> Result<Response<Body>> {
        self.finish(Some("application/octet-stream"), body.into())
    }

    /// Build response with JSON body
    pub fn json_body<T: Serialize + ?Sized>(self, body: &T) -> Result<Response<Body>> {
        let json = serde_json::to_vec(body)?;
        self.finish(Some("application/json"), Bytes::from(json))
    }

    fn finish(self, content_type: Option<&'static str>, body: Bytes) -> Result<Response<Body>> {
        let mut response = Response::builder()
            .status(self.status)
            .body(Full::new(body))?;

        *response.headers_mut() = self.headers;
        if let Some(content_type) = content_type {
            if !response.headers().contains_key(header::CONTENT_TYPE) {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        Ok(response)
    }
}

/// Convenience functions for common responses
pub mod responses {
    use super::*;

    /// 200 OK
    pub fn ok() -> ResponseBuilder {
        ResponseBuilder::new(StatusCode::OK)
    }

    /// 201 Created
    pub fn created() -> ResponseBuilder {
        ResponseBuilder::new(StatusCode::CREATED)
    }

    /// 204 No Content
    pub fn no_content() -> Result<Response<Body>> {
        ResponseBuilder::new(StatusCode::NO_CONTENT).build()
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Result<Response<Body>> {
        ResponseBuilder::new(StatusCode::NOT_FOUND).text(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_builder() {
        let response = ResponseBuilder::new(StatusCode::OK)
            .header(
                HeaderName::from_static("x-custom"),
                HeaderValue::from_static("value"),
            )
            .text("Hello, World!")
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-custom").unwrap(), "value");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_json_response() {
        let data = serde_json::json!({ "message": "success" });

        let response = ResponseBuilder::new(StatusCode::OK)
            .json_body(&data)
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let response = ResponseBuilder::new(StatusCode::OK)
            .try_header("content-type", "application/problem+json")
            .unwrap()
            .json_body(&serde_json::json!({}))
            .unwrap();

        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_invalid_header_rejected() {
        let result = ResponseBuilder::new(StatusCode::OK).try_header("bad header", "x");
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }
}
