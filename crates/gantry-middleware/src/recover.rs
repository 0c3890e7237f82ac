//! Panic recovery middleware

use async_trait::async_trait;
use futures::FutureExt;
use gantry_core::{Body, Context, Error, Middleware, Next, Result};
use http::Response;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Turns a panic anywhere downstream into a 500
///
/// Place it first in the global chain so every later middleware and the
/// handler are covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

impl Recover {
    /// Create the middleware
    pub fn new() -> Self {
        Self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[async_trait]
impl Middleware for Recover {
    async fn call(&self, ctx: Context, next: Next) -> Result<Response<Body>> {
        let method = ctx.method().clone();
        let path = ctx.path().to_string();

        match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    method = %method,
                    path = %path,
                    panic = %message,
                    "Handler panicked"
                );
                Err(Error::Internal(format!("handler panicked: {message}")))
            }
        }
    }
}
