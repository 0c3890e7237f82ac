//! Route protection: authentication and permission checks
//!
//! The router inserts [`Authenticate`] for protected routes and
//! [`Authorize`] for routes that declare permissions. Both fail through the
//! error path, so a rejected request renders as 401 or 403 JSON like any
//! other error.

use async_trait::async_trait;
use gantry_auth::{Authenticator, Authorizer, Permission};
use gantry_core::{keys, Body, Context, Error, Middleware, Next, Result};
use http::Response;
use std::fmt;
use std::sync::Arc;

/// Resolves the caller and stores the principal in the request locals
#[derive(Clone)]
pub struct Authenticate {
    authenticator: Arc<dyn Authenticator>,
}

impl Authenticate {
    /// Wrap an authenticator
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl fmt::Debug for Authenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticate")
            .field("authenticator", &self.authenticator.name())
            .finish()
    }
}

#[async_trait]
impl Middleware for Authenticate {
    async fn call(&self, mut ctx: Context, next: Next) -> Result<Response<Body>> {
        let principal = match self.authenticator.authenticate(&ctx).await {
            Ok(principal) => principal,
            Err(e) => {
                tracing::debug!(
                    path = %ctx.path(),
                    authenticator = self.authenticator.name(),
                    error = %e,
                    "Authentication rejected"
                );
                return Err(match e {
                    Error::Authentication(_) => e,
                    other => Error::Authentication(other.to_string()),
                });
            }
        };

        tracing::debug!(
            subject = %principal.subject,
            provider = %principal.provider,
            "Authenticated request"
        );
        ctx.set_local(keys::PRINCIPAL, principal);
        next.run(ctx).await
    }
}

/// Checks the principal against the permissions a route requires
#[derive(Clone)]
pub struct Authorize {
    authorizer: Arc<dyn Authorizer>,
    required: Arc<[Permission]>,
}

impl Authorize {
    /// Require every permission in `required`
    pub fn new(authorizer: Arc<dyn Authorizer>, required: impl Into<Arc<[Permission]>>) -> Self {
        Self {
            authorizer,
            required: required.into(),
        }
    }

    /// Permissions this check requires
    pub fn required(&self) -> &[Permission] {
        &self.required
    }
}

impl fmt::Debug for Authorize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorize")
            .field("authorizer", &self.authorizer)
            .field("required", &self.required)
            .finish()
    }
}

#[async_trait]
impl Middleware for Authorize {
    async fn call(&self, ctx: Context, next: Next) -> Result<Response<Body>> {
        let Some(principal) = ctx.principal() else {
            return Err(Error::Authentication(
                "no authenticated principal".to_string(),
            ));
        };

        self.authorizer.authorize(principal, &self.required)?;
        next.run(ctx).await
    }
}
