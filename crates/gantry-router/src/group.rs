//! Route groups
//!
//! A [`GroupRoute`] shares a path prefix, middleware, protection and CORS
//! settings across its routes and nested groups. Groups are flattened into
//! plain [`Route`]s before registration.

use crate::route::Route;
use gantry_auth::Permission;
use gantry_core::{Error, Middleware, Result};
use gantry_middleware::CorsConfig;
use std::fmt;
use std::sync::Arc;

/// Routes sharing a prefix and common settings
#[derive(Clone, Default)]
pub struct GroupRoute {
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
    protected: bool,
    permissions: Vec<String>,
    cors: Option<CorsConfig>,
    routes: Vec<Route>,
    groups: Vec<GroupRoute>,
}

impl GroupRoute {
    /// Create a group mounted at `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Path prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append group middleware; it runs before route middleware
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Require authentication for every route in the group
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Require a permission for every route in the group
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Default CORS settings for routes that have none of their own
    pub fn cors(mut self, config: CorsConfig) -> Self {
        self.cors = Some(config);
        self
    }

    /// Add a route
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Add several routes
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Nest a group under this one
    pub fn group(mut self, group: GroupRoute) -> Self {
        self.groups.push(group);
        self
    }

    /// Flatten into routes with prefixes and settings applied
    pub fn flatten(&self) -> Result<Vec<Route>> {
        let mut out = Vec::new();
        self.flatten_into(&Inherited::default(), &mut out)?;
        Ok(out)
    }

    fn flatten_into(&self, parent: &Inherited, out: &mut Vec<Route>) -> Result<()> {
        if !self.prefix.is_empty() && !self.prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "group prefix must start with '/': {}",
                self.prefix
            )));
        }

        let mut permissions = parent.permissions.clone();
        for raw in &self.permissions {
            let permission = Permission::parse(raw)
                .map_err(|e| Error::Config(format!("group {}: {e}", self.prefix)))?;
            push_unique(&mut permissions, permission);
        }

        let scope = Inherited {
            prefix: join_paths(&parent.prefix, &self.prefix),
            middleware: parent
                .middleware
                .iter()
                .chain(&self.middleware)
                .cloned()
                .collect(),
            protected: parent.protected || self.protected,
            permissions,
            cors: self.cors.clone().or_else(|| parent.cors.clone()),
        };

        for route in &self.routes {
            out.push(scope.apply(route));
        }
        for group in &self.groups {
            group.flatten_into(&scope, out)?;
        }
        Ok(())
    }
}

impl fmt::Debug for GroupRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRoute")
            .field("prefix", &self.prefix)
            .field("middleware", &self.middleware.len())
            .field("protected", &self.protected)
            .field("permissions", &self.permissions)
            .field("routes", &self.routes)
            .field("groups", &self.groups)
            .finish()
    }
}

#[derive(Default)]
struct Inherited {
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
    protected: bool,
    permissions: Vec<Permission>,
    cors: Option<CorsConfig>,
}

impl Inherited {
    fn apply(&self, route: &Route) -> Route {
        let mut permissions = self.permissions.clone();
        for permission in &route.permissions {
            push_unique(&mut permissions, permission.clone());
        }

        Route {
            path: join_paths(&self.prefix, &route.path),
            middleware: self
                .middleware
                .iter()
                .chain(&route.middleware)
                .cloned()
                .collect(),
            protected: self.protected || route.protected || !permissions.is_empty(),
            permissions,
            cors: route.cors.clone().or_else(|| self.cors.clone()),
            ..route.clone()
        }
    }
}

fn push_unique(permissions: &mut Vec<Permission>, permission: Permission) {
    if !permissions.contains(&permission) {
        permissions.push(permission);
    }
}

/// Join path pieces with single `/` separators and no trailing slash
///
/// ```
/// use gantry_router::group::join_paths;
///
/// assert_eq!(join_paths("/api/", "/users/"), "/api/users");
/// assert_eq!(join_paths("", "/"), "/");
/// ```
pub fn join_paths(prefix: &str, path: &str) -> String {
    let segments: Vec<&str> = prefix
        .split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}
