//! Per-route middleware pipelines
//!
//! Each registered route is compiled into an [`Endpoint`]: the route plus
//! its composed chain, in this order:
//!
//! 1. CORS, when the route or one of its groups carries CORS settings
//! 2. [`Authenticate`], when the route is protected
//! 3. [`Authorize`], when the route declares permissions
//! 4. group and route middleware
//!
//! Server-level middleware runs before all of this and is composed by the
//! runtime, so it also sees requests that match no route.

use crate::route::Route;
use gantry_auth::{Authenticator, Authorizer};
use gantry_core::{Body, Context, Error, MiddlewareStack, Next, Response, Result};
use gantry_middleware::{Authenticate, Authorize, Cors, MiddlewareBuilder};
use std::fmt;
use std::sync::Arc;

/// Authentication and authorization backends for protected routes
#[derive(Debug, Clone, Default)]
pub struct Protection {
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl Protection {
    /// No backends; protected routes are rejected at registration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authenticator used by protected routes
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Set the authorizer used by routes with permissions
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Configured authenticator
    pub fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.authenticator.as_ref()
    }

    /// Configured authorizer
    pub fn authorizer(&self) -> Option<&Arc<dyn Authorizer>> {
        self.authorizer.as_ref()
    }
}

/// Build the middleware chain for a route
pub fn compose(route: &Route, protection: &Protection) -> Result<MiddlewareStack> {
    let mut builder = MiddlewareBuilder::new();

    if let Some(cors) = &route.cors {
        cors.validate()
            .map_err(|e| Error::Config(format!("{}: {e}", route.display_name())))?;
        builder = builder.with_middleware(Arc::new(Cors::with_config(cors.clone())));
    }

    if route.protected {
        let authenticator = protection.authenticator.clone().ok_or_else(|| {
            Error::Config(format!(
                "{} is protected but no authenticator is configured",
                route.display_name()
            ))
        })?;
        builder = builder.with_middleware(Arc::new(Authenticate::new(authenticator)));
    }

    if !route.permissions.is_empty() {
        let authorizer = protection.authorizer.clone().ok_or_else(|| {
            Error::Config(format!(
                "{} requires permissions but no authorizer is configured",
                route.display_name()
            ))
        })?;
        builder = builder.with_middleware(Arc::new(Authorize::new(
            authorizer,
            route.permissions.clone(),
        )));
    }

    Ok(builder.extend(route.middleware.iter().cloned()).build())
}

/// A route together with its composed chain
#[derive(Clone)]
pub struct Endpoint {
    /// The route
    pub route: Arc<Route>,
    chain: MiddlewareStack,
}

impl Endpoint {
    /// Compile a route
    pub fn new(route: Route, protection: &Protection) -> Result<Self> {
        let chain = compose(&route, protection)?;
        Ok(Self {
            route: Arc::new(route),
            chain,
        })
    }

    /// Endpoint that runs only the route's own middleware
    pub fn bare(route: Route) -> Self {
        let chain: MiddlewareStack = route.middleware.clone().into();
        Self {
            route: Arc::new(route),
            chain,
        }
    }

    /// Number of middleware in front of the handler
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Run the chain and handler
    pub async fn run(&self, ctx: Context) -> Result<Response<Body>> {
        Next::with_handler(Arc::clone(&self.chain), self.route.handler.clone())
            .run(ctx)
            .await
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("route", &self.route)
            .field("chain", &self.chain)
            .finish()
    }
}
