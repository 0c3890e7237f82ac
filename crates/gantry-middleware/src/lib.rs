//! # Gantry Middleware
//!
//! Built-in middleware collection with:
//! - CORS (Cross-Origin Resource Sharing)
//! - CSRF (double-submit cookie)
//! - Request ID injection and request logging
//! - Panic recovery and timeout enforcement
//! - Route protection (authentication and authorization)

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod cors;
pub mod csrf;
pub mod logging;
pub mod protection;
pub mod recover;
pub mod request_id;
pub mod timeout;

pub use builder::MiddlewareBuilder;
pub use cors::{Cors, CorsConfig};
pub use csrf::{Csrf, CsrfConfig};
pub use logging::{LoggingConfig, RequestLogger};
pub use protection::{Authenticate, Authorize};
pub use recover::Recover;
pub use request_id::{IdGenerator, RequestId, RequestIdConfig};
pub use timeout::Timeout;

// Re-export core middleware types from gantry-core
pub use gantry_core::middleware::{from_fn, Middleware, Next};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::builder::MiddlewareBuilder;
    pub use crate::cors::{Cors, CorsConfig};
    pub use crate::csrf::{Csrf, CsrfConfig};
    pub use crate::logging::{LoggingConfig, RequestLogger};
    pub use crate::recover::Recover;
    pub use crate::request_id::{IdGenerator, RequestId, RequestIdConfig};
    pub use crate::timeout::Timeout;
    pub use gantry_core::middleware::{Middleware, Next};
}
