//! Authentication and authorization for Gantry routes
//!
//! [`Authenticator`]s turn a request into a [`gantry_core::Principal`];
//! [`Authorizer`]s decide whether that principal holds the permissions a
//! route declares.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod api_key;
pub mod authenticator;
pub mod jwt;
pub mod rbac;

pub use api_key::{ApiKey, ApiKeyAuthenticator, ApiKeyStore};
pub use authenticator::{extract_token, AnyAuthenticator, Authenticator};
pub use jwt::{Claims, JwtAuthenticator, JwtConfig};
pub use rbac::{Authorizer, DirectPermissions, Permission, Role, RoleBasedAccessControl};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api_key::{ApiKey, ApiKeyAuthenticator, ApiKeyStore};
    pub use crate::authenticator::Authenticator;
    pub use crate::jwt::{JwtAuthenticator, JwtConfig};
    pub use crate::rbac::{Authorizer, DirectPermissions, Permission, Role, RoleBasedAccessControl};
}
