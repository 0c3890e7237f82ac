//! Permissions, roles, and authorizers

use dashmap::DashMap;
use gantry_core::{Error, Principal, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Permission represents an action that can be performed on a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    /// Resource identifier (e.g., "users", "posts")
    pub resource: String,
    /// Action (e.g., "read", "write", "delete")
    pub action: String,
}

impl Permission {
    /// Create a new permission
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Create a wildcard permission (all actions on resource)
    pub fn wildcard(resource: impl Into<String>) -> Self {
        Self::new(resource, "*")
    }

    /// Parse `resource:action`
    ///
    /// The split happens at the last `:`, so resources may themselves
    /// contain colons (`api:v1:users:read`).
    pub fn parse(s: &str) -> Result<Self> {
        let (resource, action) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("permission '{s}' must be resource:action")))?;
        let (resource, action) = (resource.trim(), action.trim());
        if resource.is_empty() || action.is_empty() {
            return Err(Error::Config(format!(
                "permission '{s}' has an empty resource or action"
            )));
        }
        Ok(Self::new(resource, action))
    }

    /// Check if this permission matches another (considering wildcards)
    pub fn matches(&self, other: &Permission) -> bool {
        let resource_match = self.resource == other.resource || self.resource == "*";
        let action_match = self.action == other.action || self.action == "*";
        resource_match && action_match
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.to_string()
    }
}

/// Role represents a collection of permissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier
    pub name: String,
    /// Permissions granted by this role
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Parent roles (for role hierarchy)
    #[serde(default)]
    pub inherits_from: Vec<String>,
}

impl Role {
    /// Create a new role
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            inherits_from: Vec::new(),
        }
    }

    /// Add a permission to the role
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Add parent role
    pub fn inherits_from(mut self, role: impl Into<String>) -> Self {
        self.inherits_from.push(role.into());
        self
    }
}

/// Decides whether a principal holds the permissions a route requires
pub trait Authorizer: Send + Sync + fmt::Debug {
    /// Succeed only if every permission in `required` is granted
    fn authorize(&self, principal: &Principal, required: &[Permission]) -> Result<()>;
}

fn denied(principal: &Principal, permission: &Permission) -> Error {
    tracing::debug!(
        subject = %principal.subject,
        permission = %permission,
        "Permission denied"
    );
    Error::Authorization(format!("Permission denied: {permission}"))
}

/// Role-Based Access Control system
#[derive(Debug, Clone, Default)]
pub struct RoleBasedAccessControl {
    roles: Arc<DashMap<String, Role>>,
}

impl RoleBasedAccessControl {
    /// Create a new RBAC system
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role
    pub fn add_role(&self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Get a role by name
    pub fn get_role(&self, name: &str) -> Option<Role> {
        self.roles.get(name).map(|r| r.clone())
    }

    /// Check if a user with given roles has permission
    pub fn has_permission(&self, user_roles: &[String], required: &Permission) -> bool {
        let mut visited = Vec::new();
        user_roles
            .iter()
            .any(|name| self.role_has_permission(name, required, &mut visited))
    }

    // Inheritance cycles are cut by tracking visited role names.
    fn role_has_permission(
        &self,
        name: &str,
        required: &Permission,
        visited: &mut Vec<String>,
    ) -> bool {
        if visited.iter().any(|v| v == name) {
            return false;
        }
        visited.push(name.to_string());

        let Some(role) = self.get_role(name) else {
            return false;
        };

        if role.permissions.iter().any(|p| p.matches(required)) {
            return true;
        }

        role.inherits_from
            .iter()
            .any(|parent| self.role_has_permission(parent, required, visited))
    }

    /// Require permission (returns error if not granted)
    pub fn require_permission(&self, user_roles: &[String], required: &Permission) -> Result<()> {
        if self.has_permission(user_roles, required) {
            Ok(())
        } else {
            Err(Error::Authorization(format!("Permission denied: {required}")))
        }
    }
}

impl Authorizer for RoleBasedAccessControl {
    fn authorize(&self, principal: &Principal, required: &[Permission]) -> Result<()> {
        match required
            .iter()
            .find(|p| !self.has_permission(&principal.roles, p))
        {
            Some(missing) => Err(denied(principal, missing)),
            None => Ok(()),
        }
    }
}

/// Authorizes against the permissions carried by the principal itself
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPermissions;

impl Authorizer for DirectPermissions {
    fn authorize(&self, principal: &Principal, required: &[Permission]) -> Result<()> {
        let granted: Vec<Permission> = principal
            .permissions
            .iter()
            .filter_map(|p| match Permission::parse(p) {
                Ok(p) => Some(p),
                Err(_) => {
                    tracing::warn!(permission = %p, "Ignoring malformed principal permission");
                    None
                }
            })
            .collect();

        for permission in required {
            if !granted.iter().any(|g| g.matches(permission)) {
                return Err(denied(principal, permission));
            }
        }
        Ok(())
    }
}
