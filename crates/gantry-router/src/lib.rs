//! # Gantry Router
//!
//! Trie-based router with support for:
//! - Path parameter extraction (`/users/:id`)
//! - Wildcard matching (`/static/*filepath`)
//! - Method-based routing with `HEAD` falling back to `GET`
//! - Priority-based matching
//! - Route groups with shared prefix, middleware, protection and CORS
//! - Per-route pipelines (CORS, authentication, authorization, middleware)

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod group;
pub mod matcher;
pub mod pipeline;
pub mod registration;
pub mod route;
pub mod trie;

pub use group::GroupRoute;
pub use matcher::{Match, PathMatcher};
pub use pipeline::{Endpoint, Protection};
pub use registration::Registration;
pub use route::{Route, RouteBuilder};
pub use trie::RouteTrie;

use gantry_core::{Body, Context, Error, Method, Response, Result};
use gantry_middleware::cors::is_preflight;
use http::header;
use std::collections::HashMap;
use std::sync::Arc;

/// Matching options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    /// `/About` and `/about` are different routes
    pub case_sensitive: bool,
    /// `/users/` and `/users` are different routes
    pub strict_routing: bool,
}

/// Router for managing and matching routes
#[derive(Debug, Default)]
pub struct Router {
    /// Trie for each HTTP method
    tries: HashMap<Method, RouteTrie>,

    options: RouterOptions,

    protection: Protection,
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with matching options
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Set the backends used by protected routes
    ///
    /// Must be set before protected routes are registered.
    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    /// Matching options
    pub fn options(&self) -> RouterOptions {
        self.options
    }

    /// Protection backends
    pub fn protection(&self) -> &Protection {
        &self.protection
    }

    /// Add a route
    pub fn add_route(&mut self, route: Route) -> Result<()> {
        let endpoint = Endpoint::new(route, &self.protection)?;
        Self::insert(&mut self.tries, self.options, endpoint)
    }

    fn insert(
        tries: &mut HashMap<Method, RouteTrie>,
        options: RouterOptions,
        endpoint: Endpoint,
    ) -> Result<()> {
        let method = endpoint.route.method.clone();
        let path = endpoint.route.path.clone();
        let chain = endpoint.chain_len();

        tries
            .entry(method.clone())
            .or_insert_with(|| {
                RouteTrie::with_options(options.case_sensitive, options.strict_routing)
            })
            .insert(endpoint)?;

        tracing::debug!(method = %method, path = %path, middleware = chain, "Route added to router");

        Ok(())
    }

    /// Register a route, group, or list of either
    ///
    /// Either every route is added or none is. Returns the number of
    /// routes added.
    pub fn register(&mut self, registration: impl Into<Registration>) -> Result<usize> {
        let routes = registration.into().into_routes()?;
        let endpoints = routes
            .into_iter()
            .map(|route| Endpoint::new(route, &self.protection))
            .collect::<Result<Vec<_>>>()?;

        let count = endpoints.len();
        let mut staged = self.tries.clone();
        for endpoint in endpoints {
            Self::insert(&mut staged, self.options, endpoint)?;
        }
        self.tries = staged;
        Ok(count)
    }

    /// Match a request path
    pub fn match_route(&self, method: &Method, path: &str) -> Result<Match> {
        if let Some(found) = self.lookup(method, path) {
            return Ok(found);
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Err(Error::RouteNotFound(path.to_string()))
        } else {
            Err(Error::MethodNotAllowed {
                method: method.clone(),
                path: path.to_string(),
                allowed,
            })
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<Match> {
        let found = self.tries.get(method).and_then(|trie| trie.match_path(path));
        if found.is_none() && method == Method::HEAD {
            return self
                .tries
                .get(&Method::GET)
                .and_then(|trie| trie.match_path(path));
        }
        found
    }

    /// Resolve the endpoint for a request
    ///
    /// A CORS preflight for a path without an `OPTIONS` route resolves to
    /// the route of the requested method, provided that route has CORS
    /// settings; its pipeline then answers the preflight.
    pub fn resolve(&self, ctx: &Context) -> Result<Match> {
        let err = match self.match_route(ctx.method(), ctx.path()) {
            Ok(found) => return Ok(found),
            Err(err) => err,
        };

        if is_preflight(ctx) {
            let requested = ctx
                .header(header::ACCESS_CONTROL_REQUEST_METHOD.as_str())
                .and_then(|m| Method::from_bytes(m.trim().as_bytes()).ok());
            if let Some(found) = requested.and_then(|m| self.lookup(&m, ctx.path())) {
                if found.endpoint.route.cors.is_some() {
                    return Ok(found);
                }
            }
        }

        Err(err)
    }

    /// Route a request and run the matched endpoint
    pub async fn dispatch(&self, mut ctx: Context) -> Result<Response<Body>> {
        let found = self.resolve(&ctx)?;
        ctx.set_route(found.endpoint.route.path.clone(), found.params);
        found.endpoint.run(ctx).await
    }

    /// Methods with a route matching `path`, sorted by name
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self
            .tries
            .iter()
            .filter(|(_, trie)| trie.match_path(path).is_some())
            .map(|(method, _)| method.clone())
            .collect();

        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        allowed
    }

    /// Get route count for a method
    pub fn route_count(&self, method: &Method) -> usize {
        self.tries.get(method).map(RouteTrie::len).unwrap_or(0)
    }

    /// Get total route count across all methods
    pub fn total_route_count(&self) -> usize {
        self.tries.values().map(RouteTrie::len).sum()
    }

    /// All routes, sorted by path then method
    pub fn routes(&self) -> Vec<Arc<Route>> {
        let mut routes: Vec<Arc<Route>> = self
            .tries
            .values()
            .flat_map(RouteTrie::endpoints)
            .map(|endpoint| endpoint.route)
            .collect();
        routes.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.method.as_str().cmp(b.method.as_str()))
        });
        routes
    }

    /// Clear all routes
    pub fn clear(&mut self) {
        self.tries.clear();
        tracing::debug!("All routes cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_auth::{ApiKey, ApiKeyAuthenticator, ApiKeyStore, DirectPermissions};
    use gantry_core::{Bytes, Request, StatusCode};
    use gantry_middleware::CorsConfig;

    async fn echo(mut ctx: Context) -> Result<Response<Body>> {
        let id = ctx.param("id").unwrap_or("none").to_string();
        let pattern = ctx.route_pattern().unwrap_or_default().to_string();
        ctx.text(format!("{pattern} {id}"))
    }

    fn request(method: &str, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    fn ctx(builder: http::request::Builder) -> Context {
        Context::from_request(builder.body(Bytes::new()).unwrap())
    }

    async fn body(response: Response<Body>) -> String {
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn protection() -> Protection {
        let store = ApiKeyStore::new();
        store.add_key(ApiKey::new("k1", "secret", "svc").with_scope("posts:write"));
        Protection::new()
            .with_authenticator(Arc::new(ApiKeyAuthenticator::new(store)))
            .with_authorizer(Arc::new(DirectPermissions))
    }

    #[test]
    fn test_router_new() {
        let router = Router::new();
        assert_eq!(router.total_route_count(), 0);
        assert_eq!(router.options(), RouterOptions::default());
    }

    #[test]
    fn test_add_route() {
        let mut router = Router::new();
        router
            .add_route(Route::get("/users/:id", echo).build().unwrap())
            .unwrap();

        assert_eq!(router.route_count(&Method::GET), 1);
        assert_eq!(router.route_count(&Method::POST), 0);
        assert_eq!(router.total_route_count(), 1);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::new();
        router.register(Route::get("/users", echo).build().unwrap()).unwrap();

        let err = router
            .register(Route::get("/users/", echo).build().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // Same path on another method is fine
        router.register(Route::post("/users", echo).build().unwrap()).unwrap();
        assert_eq!(router.total_route_count(), 2);
    }

    #[test]
    fn test_match_route() {
        let mut router = Router::new();
        router
            .add_route(Route::get("/users/:id", echo).build().unwrap())
            .unwrap();

        let matched = router.match_route(&Method::GET, "/users/123").unwrap();
        assert_eq!(matched.endpoint.route.path, "/users/:id");
        assert_eq!(matched.params.get("id"), Some(&"123".to_string()));
    }

    #[test]
    fn test_not_found_and_method_not_allowed() {
        let mut router = Router::new();
        router
            .register(vec![
                Route::get("/posts", echo).build().unwrap(),
                Route::post("/posts", echo).build().unwrap(),
            ])
            .unwrap();

        let err = router.match_route(&Method::GET, "/missing").unwrap_err();
        assert_eq!(err.to_status_code(), StatusCode::NOT_FOUND);

        let err = router.match_route(&Method::DELETE, "/posts").unwrap_err();
        match err {
            Error::MethodNotAllowed { allowed, .. } => {
                assert_eq!(allowed, vec![Method::GET, Method::HEAD, Method::POST]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let mut router = Router::new();
        router.register(Route::get("/posts", echo).build().unwrap()).unwrap();

        let matched = router.match_route(&Method::HEAD, "/posts").unwrap();
        assert_eq!(matched.endpoint.route.method, Method::GET);
    }

    #[test]
    fn test_options() {
        let mut strict = Router::with_options(RouterOptions {
            case_sensitive: true,
            strict_routing: true,
        });
        strict.register(Route::get("/Users", echo).build().unwrap()).unwrap();

        assert!(strict.match_route(&Method::GET, "/Users").is_ok());
        assert!(strict.match_route(&Method::GET, "/users").is_err());
        assert!(strict.match_route(&Method::GET, "/Users/").is_err());

        let mut relaxed = Router::new();
        relaxed.register(Route::get("/Users", echo).build().unwrap()).unwrap();
        assert!(relaxed.match_route(&Method::GET, "/users/").is_ok());
    }

    #[test]
    fn test_protected_route_needs_backends() {
        let mut router = Router::new();
        let err = router
            .register(Route::get("/me", echo).protected().build().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(router.total_route_count(), 0);
    }

    #[test]
    fn test_failed_batch_leaves_router_unchanged() {
        let mut router = Router::new();
        router.register(Route::get("/health", echo).build().unwrap()).unwrap();

        // Second route needs an authenticator
        let err = router
            .register(vec![
                Route::get("/public", echo).build().unwrap(),
                Route::get("/admin", echo).protected().build().unwrap(),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(router.total_route_count(), 1);
        assert!(router.match_route(&Method::GET, "/public").is_err());

        // Duplicate inside the batch
        let err = router
            .register(vec![
                Route::post("/items", echo).build().unwrap(),
                Route::post("/items/", echo).build().unwrap(),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(router.route_count(&Method::POST), 0);
        assert_eq!(router.total_route_count(), 1);
    }

    #[test]
    fn test_routes_listing() {
        let mut router = Router::new();
        router
            .register(
                GroupRoute::new("/api")
                    .route(Route::post("/users", echo).name("create-user").build().unwrap())
                    .route(Route::get("/users", echo).build().unwrap())
                    .route(Route::get("/health", echo).build().unwrap()),
            )
            .unwrap();

        let listed: Vec<(String, String)> = router
            .routes()
            .iter()
            .map(|r| (r.method.to_string(), r.path.clone()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("GET".to_string(), "/api/health".to_string()),
                ("GET".to_string(), "/api/users".to_string()),
                ("POST".to_string(), "/api/users".to_string()),
            ]
        );

        router.clear();
        assert!(router.routes().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_sets_route_and_params() {
        let mut router = Router::new();
        router
            .register(Route::get("/users/:id", echo).build().unwrap())
            .unwrap();

        let response = router.dispatch(ctx(request("GET", "/users/42"))).await.unwrap();
        assert_eq!(body(response).await, "/users/:id 42");

        let err = router
            .dispatch(ctx(request("GET", "/nothing")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RouteNotFound(_)));
    }

    #[tokio::test]
    async fn test_dispatch_protected_group() {
        let mut router = Router::new().with_protection(protection());
        router
            .register(
                GroupRoute::new("/admin")
                    .permission("posts:write")
                    .route(Route::post("/posts/:id", echo).build().unwrap()),
            )
            .unwrap();

        let err = router
            .dispatch(ctx(request("POST", "/admin/posts/1")))
            .await
            .unwrap_err();
        assert_eq!(err.to_status_code(), StatusCode::UNAUTHORIZED);

        let response = router
            .dispatch(ctx(request("POST", "/admin/posts/1").header("X-API-Key", "secret")))
            .await
            .unwrap();
        assert_eq!(body(response).await, "/admin/posts/:id 1");
    }

    #[tokio::test]
    async fn test_preflight_uses_route_cors() {
        let mut router = Router::new().with_protection(protection());
        router
            .register(vec![
                Route::post("/posts", echo)
                    .permission("posts:write")
                    .cors(CorsConfig::for_origins(["https://app.example.com"]))
                    .build()
                    .unwrap(),
                Route::put("/plain", echo).build().unwrap(),
            ])
            .unwrap();

        let preflight = |uri: &str, method: &str| {
            ctx(request("OPTIONS", uri)
                .header(header::ORIGIN, "https://app.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, method))
        };

        let response = router.dispatch(preflight("/posts", "POST")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.com"
        );

        // No CORS on the target route: plain 405
        let err = router.dispatch(preflight("/plain", "PUT")).await.unwrap_err();
        assert_eq!(err.to_status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
