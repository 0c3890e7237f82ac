//! Authenticator trait and composition

use async_trait::async_trait;
use gantry_core::{Context, Error, Principal, Result};
use std::sync::Arc;

/// Resolves the caller of a request into a [`Principal`]
#[async_trait]
pub trait Authenticator: Send + Sync + std::fmt::Debug {
    /// Authenticate the request, or fail with `Error::Authentication`
    async fn authenticate(&self, ctx: &Context) -> Result<Principal>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Extract a token from `header`, stripping `prefix` (case-insensitive)
pub fn extract_token<'a>(ctx: &'a Context, header: &str, prefix: &str) -> Option<&'a str> {
    let value = ctx.header(header)?.trim();
    if prefix.is_empty() {
        return (!value.is_empty()).then_some(value);
    }

    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        let token = value[prefix.len()..].trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

/// Tries each authenticator in order; the first success wins
#[derive(Debug, Clone, Default)]
pub struct AnyAuthenticator {
    inner: Vec<Arc<dyn Authenticator>>,
}

impl AnyAuthenticator {
    /// Create an empty composite
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an authenticator
    pub fn with(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.inner.push(authenticator);
        self
    }
}

#[async_trait]
impl Authenticator for AnyAuthenticator {
    async fn authenticate(&self, ctx: &Context) -> Result<Principal> {
        let mut last_error = None;
        for authenticator in &self.inner {
            match authenticator.authenticate(ctx).await {
                Ok(principal) => return Ok(principal),
                Err(e) => {
                    tracing::trace!(
                        authenticator = authenticator.name(),
                        error = %e,
                        "Authenticator declined request"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Authentication("no authenticators configured".to_string())
        }))
    }

    fn name(&self) -> &str {
        "any"
    }
}
