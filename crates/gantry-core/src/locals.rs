//! Request-scoped key-value store with namespaced keys
//!
//! Middleware and handlers share data through [`Locals`]. Every key lives in a
//! namespace so that independently written middleware cannot overwrite each
//! other's values. The `gantry` namespace belongs to the framework.

use crate::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Namespace reserved for framework-owned keys
pub const RESERVED_NAMESPACE: &str = "gantry";

/// Namespace used by [`LocalKey::app`]
pub const APP_NAMESPACE: &str = "app";

/// A namespaced key into [`Locals`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalKey {
    namespace: String,
    name: String,
}

impl LocalKey {
    /// Create a key in a user namespace
    ///
    /// Fails for the reserved `gantry` namespace and for empty or dotted parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let name = name.into();

        if namespace == RESERVED_NAMESPACE {
            return Err(Error::Config(format!(
                "namespace '{RESERVED_NAMESPACE}' is reserved for framework keys"
            )));
        }
        check_part("namespace", &namespace)?;
        check_part("name", &name)?;

        Ok(Self { namespace, name })
    }

    /// Create a key in the `app` namespace
    pub fn app(name: impl Into<String>) -> Result<Self> {
        Self::new(APP_NAMESPACE, name)
    }

    /// Framework-owned key. Not for application code.
    #[doc(hidden)]
    pub const fn internal(name: &'static str) -> InternalKey {
        InternalKey(name)
    }

    /// Namespace part
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name part
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

fn check_part(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Config(format!("local key {kind} cannot be empty")));
    }
    if value.contains('.') || value.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "local key {kind} '{value}' must not contain '.' or whitespace"
        )));
    }
    Ok(())
}

/// Compile-time key in the reserved namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalKey(&'static str);

impl InternalKey {
    fn render(self) -> String {
        format!("{RESERVED_NAMESPACE}.{}", self.0)
    }
}

/// Framework keys
pub mod keys {
    use super::{InternalKey, LocalKey};

    /// Request id assigned by the request id middleware
    pub const REQUEST_ID: InternalKey = LocalKey::internal("request_id");
    /// Authenticated principal
    pub const PRINCIPAL: InternalKey = LocalKey::internal("principal");
    /// CSRF token for the current request
    pub const CSRF_TOKEN: InternalKey = LocalKey::internal("csrf_token");
    /// `Instant` the request entered the chain
    pub const START_TIME: InternalKey = LocalKey::internal("start_time");
    /// [`crate::error::ErrorRenderer`] installed by the server
    pub const ERROR_RENDERER: InternalKey = LocalKey::internal("error_renderer");
}

/// Anything that renders to a local key
pub trait AsLocalKey {
    /// The rendered `namespace.name` form
    fn render_key(&self) -> String;
}

impl AsLocalKey for LocalKey {
    fn render_key(&self) -> String {
        self.to_string()
    }
}

impl AsLocalKey for &LocalKey {
    fn render_key(&self) -> String {
        self.to_string()
    }
}

impl AsLocalKey for InternalKey {
    fn render_key(&self) -> String {
        self.render()
    }
}

/// Per-request key-value store
#[derive(Clone, Default)]
pub struct Locals {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Locals {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning whether a previous value was replaced
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl AsLocalKey, value: T) -> bool {
        self.values
            .insert(key.render_key(), Arc::new(value))
            .is_some()
    }

    /// Get a value; `None` when absent or stored under a different type
    pub fn get<T: Any + Send + Sync>(&self, key: impl AsLocalKey) -> Option<&T> {
        self.values
            .get(&key.render_key())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Remove a value
    pub fn remove(&mut self, key: impl AsLocalKey) -> bool {
        self.values.remove(&key.render_key()).is_some()
    }

    /// Check whether a key is set
    pub fn contains(&self, key: impl AsLocalKey) -> bool {
        self.values.contains_key(&key.render_key())
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rendered keys currently set
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Locals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Locals").field("keys", &keys).finish()
    }
}
