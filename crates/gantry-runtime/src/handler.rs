//! HTTP request handler

use crate::engine::{self, EngineSettings};
use bytes::Bytes;
use gantry_core::{
    handler, keys, Body, BoxHandler, Context, ErrorRenderer, MiddlewareStack, Next,
};
use gantry_router::Router;
use http::{HeaderValue, Request, Response};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// HTTP request handler
///
/// Runs every request through the global middleware chain and then the
/// router. Requests that match no route still pass through the global
/// chain, so request ids, logging and CORS apply to 404s as well.
#[derive(Clone)]
pub struct RequestHandler {
    router: Arc<Router>,
    middleware_chain: MiddlewareStack,
    dispatch: BoxHandler,
    renderer: ErrorRenderer,
    settings: EngineSettings,
    server_name: Option<HeaderValue>,
    request_count: Arc<AtomicUsize>,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("routes", &self.router.total_route_count())
            .field("middleware_count", &self.middleware_chain.len())
            .field("renderer", &self.renderer)
            .field("settings", &self.settings)
            .field("request_count", &self.request_count)
            .finish()
    }
}

impl RequestHandler {
    /// Create a new request handler
    pub fn new(
        router: Arc<Router>,
        middleware_chain: MiddlewareStack,
        renderer: ErrorRenderer,
        settings: EngineSettings,
    ) -> Self {
        let dispatch = {
            let router = Arc::clone(&router);
            handler(move |ctx: Context| {
                let router = Arc::clone(&router);
                async move { router.dispatch(ctx).await }
            })
        };

        Self {
            router,
            middleware_chain,
            dispatch,
            renderer,
            settings,
            server_name: None,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Send `name` in the `Server` header of every response
    pub fn with_server_name(mut self, name: &str) -> Self {
        self.server_name = HeaderValue::from_str(name).ok();
        self
    }

    /// Router behind this handler
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Requests handled so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Handle a request from the engine
    ///
    /// Never fails: errors are rendered through the configured error
    /// handler.
    pub async fn handle<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> Response<Body>
    where
        B: http_body::Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        debug!(method = %method, path = %path, "Handling request");

        let result = match engine::into_context(req, remote_addr, &self.settings).await {
            Ok(mut ctx) => {
                ctx.set_local(keys::ERROR_RENDERER, self.renderer.clone());
                Next::with_handler(Arc::clone(&self.middleware_chain), self.dispatch.clone())
                    .run(ctx)
                    .await
            }
            Err(e) => Err(e),
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                debug!(method = %method, path = %path, error = %e, "Rendering error response");
                self.renderer.render(&e)
            }
        };

        // Middleware such as RequestId render errors themselves, so judge
        // the final response rather than the error path
        let status = response.status();
        if status.is_server_error() {
            error!(method = %method, path = %path, status = status.as_u16(), "Request failed");
        } else if status.is_client_error() {
            debug!(method = %method, path = %path, status = status.as_u16(), "Request rejected");
        }

        engine::finalize(response, self.server_name.as_ref())
    }
}
