//! # Gantry Core
//!
//! Core types, traits, and error handling for Gantry.
//!
//! This crate provides the engine-independent surface that application code
//! is written against:
//! - [`Context`]: request data plus response building
//! - [`Locals`] with namespaced [`LocalKey`]s
//! - [`Middleware`] / [`Next`] and [`Handler`]
//! - Tag-driven [`validation`]
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
pub mod locals;
pub mod middleware;
pub mod response;
pub mod types;
pub mod validation;

pub use context::Context;
pub use cookie::{Cookie, SameSite};
pub use error::{Error, ErrorRenderer, Result};
pub use handler::{handler, BoxHandler, Handler};
pub use locals::{keys, LocalKey, Locals};
pub use middleware::{from_fn, Middleware, MiddlewareStack, Next};
pub use response::{Body, ResponseBuilder};
pub use types::Principal;
pub use validation::{Validate, Validator};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::error::{Error, Result};
    pub use crate::handler::{handler, Handler};
    pub use crate::locals::LocalKey;
    pub use crate::middleware::{from_fn, Middleware, Next};
    pub use crate::response::{Body, ResponseBuilder};
    pub use crate::types::Principal;
    pub use crate::validation::{Validate, Validator};
    pub use http::{Method, Response, StatusCode};
}
