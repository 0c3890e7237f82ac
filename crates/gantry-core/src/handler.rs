//! Request handlers

use crate::context::Context;
use crate::response::Body;
use crate::Result;
use futures::future::BoxFuture;
use http::Response;
use std::future::Future;
use std::sync::Arc;

/// Terminal request handler
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Result<Response<Body>>>`,
/// so plain async closures and functions can be used directly.
pub trait Handler: Send + Sync + 'static {
    /// Handle the request
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Response<Body>>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Response<Body>>> {
        Box::pin(self(ctx))
    }
}

/// Shared handler
pub type BoxHandler = Arc<dyn Handler>;

/// Wrap a handler for sharing
pub fn handler<H: Handler>(h: H) -> BoxHandler {
    Arc::new(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request, StatusCode};

    async fn hello(mut ctx: Context) -> Result<Response<Body>> {
        let name = ctx.query("name").unwrap_or_else(|| "world".to_string());
        ctx.text(format!("hello {name}"))
    }

    #[tokio::test]
    async fn test_fn_and_closure_handlers() {
        let from_fn = handler(hello);
        let from_closure = handler(|mut ctx: Context| async move { ctx.send_status(StatusCode::ACCEPTED) });

        let req = || Context::from_request(Request::builder().uri("/?name=gantry").body(Bytes::new()).unwrap());

        let response = from_fn.call(req()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = from_closure.call(req()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
