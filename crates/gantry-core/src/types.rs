//! Common types used throughout Gantry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authenticated identity attached to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject (user ID, service account, etc.)
    pub subject: String,

    /// Authenticator that produced this principal
    pub provider: String,

    /// Role names
    #[serde(default)]
    pub roles: Vec<String>,

    /// Permissions granted directly (`resource:action`)
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Additional claims
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl Principal {
    /// Create a principal with no roles or permissions
    pub fn new(subject: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            provider: provider.into(),
            roles: Vec::new(),
            permissions: Vec::new(),
            claims: HashMap::new(),
        }
    }

    /// Add a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add a directly granted permission
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Check for a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Get a claim value
    pub fn claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.claims.get(key)
    }
}
