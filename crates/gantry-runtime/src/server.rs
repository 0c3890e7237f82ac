//! HTTP server implementation

use crate::engine::EngineSettings;
use crate::handler::RequestHandler;
use crate::shutdown::ShutdownSignal;
use crate::RuntimeState;
use bytes::Bytes;
use gantry_auth::{
    AnyAuthenticator, ApiKeyAuthenticator, ApiKeyStore, Authenticator, Authorizer,
    JwtAuthenticator,
};
use gantry_config::{validate_config, AuthConfig, Config};
use gantry_core::{Body, Error, ErrorRenderer, Middleware, MiddlewareStack, Result};
use gantry_middleware::{MiddlewareBuilder, RequestIdConfig};
use gantry_router::{Protection, Registration, Router, RouterOptions};
use http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

/// HTTP server
pub struct Server {
    config: Config,
    handler: RequestHandler,
    state: Arc<RwLock<RuntimeState>>,
    shutdown: ShutdownSignal,
    active_connections: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen", &self.config.server.listen)
            .field("handler", &self.handler)
            .field("active_connections", &self.active_connections)
            .finish()
    }
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Get the current state
    pub async fn state(&self) -> RuntimeState {
        *self.state.read().await
    }

    /// Configuration the server was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get router
    pub fn router(&self) -> &Router {
        self.handler.router()
    }

    /// Get request count
    pub fn request_count(&self) -> usize {
        self.handler.request_count()
    }

    /// Open connections
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Handle a single request without a socket
    ///
    /// Runs the same pipeline as a served connection.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Body>
    where
        B: http_body::Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.handler.handle(req, None).await
    }

    /// Bind the configured listen address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.server.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Runtime(format!("Failed to bind to {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        *self.state.write().await = RuntimeState::Running;

        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Runtime(format!("Failed to read listen address: {e}")))?;

        tracing::info!(
            listen = %local_addr,
            app_name = %self.config.server.app_name,
            routes = self.router().total_route_count(),
            "Server listening"
        );

        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .keep_alive(true)
            .header_read_timeout(self.config.server.idle_timeout);

        let mut shutdown_rx = self.shutdown.subscribe();

        if !self.shutdown.is_triggered() {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::trace!("Accepted connection from {}", addr);
                                self.spawn_connection(&http, stream, addr);
                            }
                            Err(e) => {
                                tracing::error!("Failed to accept connection: {}", e);
                            }
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        drop(listener);
        *self.state.write().await = RuntimeState::ShuttingDown;

        self.drain().await;

        *self.state.write().await = RuntimeState::Stopped;
        Ok(())
    }

    fn spawn_connection(&self, http: &http1::Builder, stream: TcpStream, remote: SocketAddr) {
        let handler = self.handler.clone();
        let service = hyper::service::service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();
            async move { Ok::<_, Infallible>(handler.handle(req, Some(remote)).await) }
        });

        let http = http.clone();
        let shutdown = self.shutdown.clone();
        let guard = ConnectionGuard::new(Arc::clone(&self.active_connections));

        tokio::spawn(async move {
            let _guard = guard;
            let conn = http.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.wait() => {
                    // Finish the in-flight request, then close
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };

            if let Err(e) = result {
                tracing::debug!(remote = %remote, "HTTP connection error: {}", e);
            }
        });
    }

    // Waits for open connections to finish, bounded by shutdown_timeout
    async fn drain(&self) {
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let start = Instant::now();

        tracing::info!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Waiting for in-flight requests to complete"
        );

        loop {
            let active = self.active_connections();

            if active == 0 {
                tracing::info!("All connections closed, shutting down cleanly");
                break;
            }

            if start.elapsed() >= shutdown_timeout {
                tracing::warn!(
                    active_connections = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tracing::info!(
            shutdown_duration_ms = start.elapsed().as_millis(),
            "Server stopped"
        );
    }
}

struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Server builder
///
/// Routes are compiled in [`ServerBuilder::build`], after the
/// authentication backends are known.
#[derive(Default)]
pub struct ServerBuilder {
    config: Option<Config>,
    registrations: Vec<Registration>,
    middleware: Vec<Arc<dyn Middleware>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    error_handler: ErrorRenderer,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config.is_some())
            .field("registrations", &self.registrations.len())
            .field("middleware", &self.middleware)
            .field("authenticator", &self.authenticator)
            .field("authorizer", &self.authorizer)
            .field("error_handler", &self.error_handler)
            .finish()
    }
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration (defaults apply when unset)
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a route, group or list of either
    pub fn register(mut self, registration: impl Into<Registration>) -> Self {
        self.registrations.push(registration.into());
        self
    }

    /// Add server-level middleware
    ///
    /// Runs after the built-in middleware and before any route's chain,
    /// including for requests that match no route.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Authenticator for protected routes, replacing the configured backends
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Authorizer for routes that declare permissions
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Custom error rendering
    pub fn error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) -> Response<Body> + Send + Sync + 'static,
    {
        self.error_handler = ErrorRenderer::new(f);
        self
    }

    /// Build the server
    pub fn build(self) -> Result<Server> {
        let config = self.config.unwrap_or_default();
        validate_config(&config)?;

        let authenticator = match self.authenticator {
            Some(authenticator) => Some(authenticator),
            None => configured_authenticator(&config.auth)?,
        };
        let mut protection = Protection::new();
        if let Some(authenticator) = authenticator {
            protection = protection.with_authenticator(authenticator);
        }
        if let Some(authorizer) = self.authorizer {
            protection = protection.with_authorizer(authorizer);
        }

        let mut router = Router::with_options(RouterOptions {
            case_sensitive: config.server.case_sensitive,
            strict_routing: config.server.strict_routing,
        })
        .with_protection(protection);

        for registration in self.registrations {
            router.register(registration)?;
        }

        let chain = global_chain(&config, self.middleware)?;

        let settings = EngineSettings {
            body_limit: config.server.body_limit,
            read_timeout: config.server.read_timeout,
            trust_proxy: config.server.trust_proxy,
        };

        tracing::info!(
            routes = router.total_route_count(),
            middleware = chain.len(),
            "Server components initialized"
        );

        let handler = RequestHandler::new(Arc::new(router), chain, self.error_handler, settings)
            .with_server_name(&config.server.app_name);

        Ok(Server {
            config,
            handler,
            state: Arc::new(RwLock::new(RuntimeState::Initializing)),
            shutdown: ShutdownSignal::new(),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// Authenticator built from the `auth` section; several backends are tried in order
fn configured_authenticator(auth: &AuthConfig) -> Result<Option<Arc<dyn Authenticator>>> {
    let mut backends: Vec<Arc<dyn Authenticator>> = Vec::new();

    if let Some(jwt) = &auth.jwt {
        backends.push(Arc::new(JwtAuthenticator::with_config(jwt.clone())?));
    }

    if !auth.api_keys.is_empty() {
        let store = ApiKeyStore::new();
        for entry in &auth.api_keys {
            store.add_key(entry.into());
        }
        backends.push(Arc::new(ApiKeyAuthenticator::new(store)));
    }

    Ok(match backends.len() {
        0 => None,
        1 => backends.pop(),
        _ => Some(Arc::new(
            backends
                .into_iter()
                .fold(AnyAuthenticator::new(), AnyAuthenticator::with),
        )),
    })
}

/// Server-level chain: recover, request id, logging, timeout, CORS, CSRF, user middleware
fn global_chain(config: &Config, user: Vec<Arc<dyn Middleware>>) -> Result<MiddlewareStack> {
    let mut builder = MiddlewareBuilder::new();

    if config.middleware.recover {
        builder = builder.with_recover();
    }

    if config.middleware.request_id {
        builder = builder.with_request_id_config(RequestIdConfig {
            header_name: config.middleware.request_id_header.clone(),
            ..Default::default()
        });
    }

    if config.middleware.request_logging {
        builder = builder.with_logging_config(config.logging.request_logging()?);
    }

    builder = builder.with_timeout_duration(config.server.write_timeout);

    if let Some(cors) = &config.cors {
        builder = builder.with_cors_config(cors.clone());
    }

    if let Some(csrf) = &config.csrf {
        builder = builder.with_csrf_config(csrf.clone());
    }

    Ok(builder.extend(user).build())
}
