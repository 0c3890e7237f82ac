//! Route definition and builder

use gantry_auth::Permission;
use gantry_core::{handler, BoxHandler, Error, Handler, Middleware, Result};
use gantry_middleware::CorsConfig;
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Route definition
#[derive(Clone)]
pub struct Route {
    /// HTTP method
    pub method: Method,

    /// Path pattern (e.g., "/users/:id")
    pub path: String,

    /// Terminal handler
    pub handler: BoxHandler,

    /// Optional name for diagnostics
    pub name: Option<String>,

    /// Route middleware, run after protection and before the handler
    pub middleware: Vec<Arc<dyn Middleware>>,

    /// Requires an authenticated principal
    pub protected: bool,

    /// Permissions the principal must hold
    pub permissions: Vec<Permission>,

    /// Route-level CORS settings
    pub cors: Option<CorsConfig>,

    /// Priority (higher = matched first)
    pub priority: i32,

    /// Route metadata
    pub metadata: HashMap<String, String>,
}

impl Route {
    /// Create a new route builder
    pub fn builder() -> RouteBuilder {
        RouteBuilder::new()
    }

    /// `GET` route
    pub fn get(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::GET).path(path).handler(h)
    }

    /// `POST` route
    pub fn post(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::POST).path(path).handler(h)
    }

    /// `PUT` route
    pub fn put(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::PUT).path(path).handler(h)
    }

    /// `PATCH` route
    pub fn patch(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::PATCH).path(path).handler(h)
    }

    /// `DELETE` route
    pub fn delete(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::DELETE).path(path).handler(h)
    }

    /// `HEAD` route
    pub fn head(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::HEAD).path(path).handler(h)
    }

    /// `OPTIONS` route
    pub fn options(path: impl Into<String>, h: impl Handler) -> RouteBuilder {
        RouteBuilder::new().method(Method::OPTIONS).path(path).handler(h)
    }

    /// Display name: the explicit name, else `METHOD path`
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.method, self.path),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("middleware", &self.middleware.len())
            .field("protected", &self.protected)
            .field("permissions", &self.permissions)
            .field("cors", &self.cors.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Builder for constructing routes
#[derive(Default)]
pub struct RouteBuilder {
    method: Option<Method>,
    path: Option<String>,
    handler: Option<BoxHandler>,
    name: Option<String>,
    middleware: Vec<Arc<dyn Middleware>>,
    protected: bool,
    permissions: Vec<String>,
    cors: Option<CorsConfig>,
    priority: i32,
    metadata: HashMap<String, String>,
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("has_handler", &self.handler.is_some())
            .field("protected", &self.protected)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl RouteBuilder {
    /// Create a new route builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the path pattern
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the handler
    pub fn handler(mut self, h: impl Handler) -> Self {
        self.handler = Some(handler(h));
        self
    }

    /// Name the route
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append route middleware
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Require authentication
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Require a permission (`resource:action`); implies [`Self::protected`]
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Require several permissions
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Attach route-level CORS settings
    pub fn cors(mut self, config: CorsConfig) -> Self {
        self.cors = Some(config);
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add metadata
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the route
    pub fn build(self) -> Result<Route> {
        let method = self
            .method
            .ok_or_else(|| Error::Config("method is required".to_string()))?;

        let path = self
            .path
            .ok_or_else(|| Error::Config("path is required".to_string()))?;

        let handler = self
            .handler
            .ok_or_else(|| Error::Config(format!("handler is required for {method} {path}")))?;

        // Validate path
        if !path.starts_with('/') {
            return Err(Error::Config(format!("path must start with '/': {path}")));
        }

        let permissions = self
            .permissions
            .iter()
            .map(|p| Permission::parse(p))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::Config(format!("{method} {path}: {e}")))?;

        Ok(Route {
            protected: self.protected || !permissions.is_empty(),
            method,
            path,
            handler,
            name: self.name,
            middleware: self.middleware,
            permissions,
            cors: self.cors,
            priority: self.priority,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{Context, StatusCode};

    async fn ok(mut ctx: Context) -> Result<http::Response<gantry_core::Body>> {
        ctx.send_status(StatusCode::OK)
    }

    #[test]
    fn test_route_builder() {
        let route = RouteBuilder::new()
            .method(Method::GET)
            .path("/users/:id")
            .handler(ok)
            .name("user-detail")
            .priority(10)
            .metadata("version", "v1")
            .build()
            .unwrap();

        assert_eq!(route.method, Method::GET);
        assert_eq!(route.path, "/users/:id");
        assert_eq!(route.priority, 10);
        assert_eq!(route.display_name(), "user-detail");
        assert_eq!(route.metadata.get("version"), Some(&"v1".to_string()));
        assert!(!route.protected);
    }

    #[test]
    fn test_shorthands() {
        let route = Route::delete("/posts/:id", ok).build().unwrap();
        assert_eq!(route.method, Method::DELETE);
        assert_eq!(route.display_name(), "DELETE /posts/:id");

        let route = Route::options("/posts", ok).build().unwrap();
        assert_eq!(route.method, Method::OPTIONS);
    }

    #[test]
    fn test_route_builder_missing_fields() {
        assert!(RouteBuilder::new().path("/users").handler(ok).build().is_err());
        assert!(RouteBuilder::new().method(Method::GET).handler(ok).build().is_err());

        let err = RouteBuilder::new()
            .method(Method::GET)
            .path("/users")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_route_builder_invalid_path() {
        let result = Route::get("users", ok).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_permissions_imply_protected() {
        let route = Route::post("/posts", ok)
            .permission("posts:write")
            .build()
            .unwrap();
        assert!(route.protected);
        assert_eq!(route.permissions, vec![Permission::new("posts", "write")]);

        let result = Route::post("/posts", ok).permission("no-colon").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
