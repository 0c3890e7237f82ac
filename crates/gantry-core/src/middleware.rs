//! Middleware trait and chain execution

use crate::context::Context;
use crate::handler::BoxHandler;
use crate::response::Body;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::Response;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Middleware for request/response processing
///
/// A middleware either answers the request itself (short-circuit) or
/// delegates by calling [`Next::run`].
#[async_trait]
pub trait Middleware: Send + Sync + fmt::Debug {
    /// Process a request
    ///
    /// # Arguments
    ///
    /// * `ctx` - The request context
    /// * `next` - The rest of the chain, ending in the route handler
    async fn call(&self, ctx: Context, next: Next) -> Result<Response<Body>>;
}

/// Shared middleware chain
pub type MiddlewareStack = Arc<[Arc<dyn Middleware>]>;

/// Represents the next middleware/handler in the chain
pub struct Next {
    middleware_stack: MiddlewareStack,
    index: usize,
    final_handler: Option<BoxHandler>,
}

impl Next {
    /// Create a new Next from a middleware stack
    pub fn new(middleware_stack: MiddlewareStack) -> Self {
        Self {
            middleware_stack,
            index: 0,
            final_handler: None,
        }
    }

    /// Create a new Next with a final handler
    pub fn with_handler(middleware_stack: MiddlewareStack, handler: BoxHandler) -> Self {
        Self {
            middleware_stack,
            index: 0,
            final_handler: Some(handler),
        }
    }

    /// Run the next middleware or final handler
    pub async fn run(self, ctx: Context) -> Result<Response<Body>> {
        if let Some(middleware) = self.middleware_stack.get(self.index) {
            let next = Self {
                middleware_stack: Arc::clone(&self.middleware_stack),
                index: self.index + 1,
                final_handler: self.final_handler.clone(),
            };
            middleware.call(ctx, next).await
        } else if let Some(handler) = self.final_handler {
            handler.call(ctx).await
        } else {
            Err(Error::Internal(
                "Middleware chain completed without handler".to_string(),
            ))
        }
    }

    /// Middleware left to run, excluding the handler
    pub fn remaining(&self) -> usize {
        self.middleware_stack.len().saturating_sub(self.index)
    }
}

impl Clone for Next {
    fn clone(&self) -> Self {
        Self {
            middleware_stack: Arc::clone(&self.middleware_stack),
            index: self.index,
            final_handler: self.final_handler.clone(),
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.remaining())
            .field("has_handler", &self.final_handler.is_some())
            .finish()
    }
}

type MiddlewareFn =
    dyn Fn(Context, Next) -> BoxFuture<'static, Result<Response<Body>>> + Send + Sync;

/// Middleware built from a closure, see [`from_fn`]
pub struct FnMiddleware {
    name: &'static str,
    f: Box<MiddlewareFn>,
}

impl fmt::Debug for FnMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Middleware for FnMiddleware {
    async fn call(&self, ctx: Context, next: Next) -> Result<Response<Body>> {
        (self.f)(ctx, next).await
    }
}

/// Turn an async closure into a middleware
///
/// ```
/// use gantry_core::middleware::from_fn;
///
/// let deny_all = from_fn("deny-all", |mut ctx, _next| async move {
///     ctx.send_status(http::StatusCode::FORBIDDEN)
/// });
/// ```
pub fn from_fn<F, Fut>(name: &'static str, f: F) -> Arc<dyn Middleware>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
{
    Arc::new(FnMiddleware {
        name,
        f: Box::new(move |ctx, next| Box::pin(f(ctx, next))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::locals::LocalKey;
    use bytes::Bytes;
    use http::{Request, StatusCode};

    #[derive(Debug)]
    struct Tag {
        name: &'static str,
    }

    #[async_trait]
    impl Middleware for Tag {
        async fn call(&self, mut ctx: Context, next: Next) -> Result<Response<Body>> {
            let key = LocalKey::app("trail").unwrap();
            let mut trail = ctx.local::<Vec<&'static str>>(&key).cloned().unwrap_or_default();
            trail.push(self.name);
            ctx.set_local(&key, trail);
            next.run(ctx).await
        }
    }

    fn request() -> Context {
        Context::from_request(Request::builder().uri("/test").body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn test_chain_without_handler_errors() {
        let stack: MiddlewareStack = Arc::new([
            Arc::new(Tag { name: "first" }) as Arc<dyn Middleware>,
            Arc::new(Tag { name: "second" }),
        ]);

        let result = Next::new(stack).run(request()).await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let stack: MiddlewareStack = Arc::new([
            Arc::new(Tag { name: "first" }) as Arc<dyn Middleware>,
            Arc::new(Tag { name: "second" }),
        ]);
        let h = handler(|mut ctx: Context| async move {
            let trail = ctx
                .local::<Vec<&'static str>>(LocalKey::app("trail").unwrap())
                .cloned()
                .unwrap_or_default();
            ctx.text(trail.join(","))
        });

        let response = Next::with_handler(stack, h).run(request()).await.unwrap();
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"first,second");
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let stack: MiddlewareStack = Arc::new([from_fn("deny", |mut ctx, _next| async move {
            ctx.send_status(StatusCode::FORBIDDEN)
        })]);
        let h = handler(|mut ctx: Context| async move { ctx.text("unreachable") });

        let response = Next::with_handler(stack, h).run(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
