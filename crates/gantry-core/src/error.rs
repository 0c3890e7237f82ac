//! Error types for Gantry

use crate::response::{Body, ResponseBuilder};
use crate::validation::ValidationErrors;
use http::{header, HeaderValue, Method, Response, StatusCode};
use http_body_util::Full;
use std::fmt;
use std::sync::Arc;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for Gantry
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unacceptable request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body exceeded the configured limit
    #[error("Request body exceeds limit of {limit} bytes")]
    BodyTooLarge {
        /// Configured limit
        limit: usize,
    },

    /// Route not found
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Path exists but not for this method
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// Requested method
        method: Method,
        /// Requested path
        path: String,
        /// Methods registered for the path
        allowed: Vec<Method>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization error
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// CSRF token missing or mismatched
    #[error("CSRF validation failed: {0}")]
    Csrf(String),

    /// Struct validation failed
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Handler ran past its deadline
    #[error("Request timed out")]
    Timeout,

    /// Explicit status raised by a handler
    #[error("{message}")]
    Status {
        /// Status code to respond with
        code: StatusCode,
        /// Message for the client
        message: String,
    },

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Authorization(_) | Error::Csrf(_) => StatusCode::FORBIDDEN,
            Error::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Error::Status { code, .. } => *code,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create an error that responds with an explicit status
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Error::Status {
            code,
            message: message.into(),
        }
    }

    /// Render the error as a JSON response
    ///
    /// Server-side failures (5xx) never leak their message to the client.
    pub fn into_response(&self) -> Response<Body> {
        let status = self.to_status_code();
        let message = if status.is_server_error() && !matches!(self, Error::Status { .. }) {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };

        let mut body = serde_json::json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "message": message,
        });
        if let Error::Validation(errors) = self {
            body["fields"] = serde_json::to_value(errors.fields()).unwrap_or_default();
        }

        let mut response = ResponseBuilder::new(status)
            .json_body(&body)
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(Full::new(bytes::Bytes::from(message)));
                *fallback.status_mut() = status;
                fallback
            });

        match self {
            Error::MethodNotAllowed { allowed, .. } => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
            }
            Error::Authentication(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }

        response
    }
}

type RenderFn = dyn Fn(&Error) -> Response<Body> + Send + Sync;

/// Turns errors into responses
///
/// The server installs one per request (see [`crate::Context::error_renderer`]),
/// so middleware that must produce a response for a failed downstream call
/// renders it the same way the server would.
#[derive(Clone, Default)]
pub struct ErrorRenderer(Option<Arc<RenderFn>>);

impl ErrorRenderer {
    /// Renderer backed by a custom function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Error) -> Response<Body> + Send + Sync + 'static,
    {
        Self(Some(Arc::new(f)))
    }

    /// Render `err`, falling back to [`Error::into_response`]
    pub fn render(&self, err: &Error) -> Response<Body> {
        match &self.0 {
            Some(f) => f(err),
            None => err.into_response(),
        }
    }
}

impl fmt::Debug for ErrorRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRenderer")
            .field("custom", &self.0.is_some())
            .finish()
    }
}
