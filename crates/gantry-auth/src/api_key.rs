//! API key authentication

use crate::authenticator::{extract_token, Authenticator};
use async_trait::async_trait;
use dashmap::DashMap;
use gantry_core::{Context, Error, Principal, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Default header carrying the key
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// API key for authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique key identifier
    pub id: String,
    /// The key value presented by clients
    pub key: String,
    /// User/service this key belongs to
    pub owner: String,
    /// Permissions granted to the key (`resource:action`)
    pub scopes: Vec<String>,
    /// Expiration time (if any)
    pub expires_at: Option<SystemTime>,
    /// Whether key is active
    pub active: bool,
}

impl ApiKey {
    /// Create a new active API key
    pub fn new(id: impl Into<String>, key: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            owner: owner.into(),
            scopes: Vec::new(),
            expires_at: None,
            active: true,
        }
    }

    /// Add scope to API key
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Set expiration
    pub fn expires_at(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if key is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| SystemTime::now() > expires_at)
            .unwrap_or(false)
    }

    /// Check if key is valid (active and not expired)
    pub fn is_valid(&self) -> bool {
        self.active && !self.is_expired()
    }
}

/// API key store
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: Arc<DashMap<String, ApiKey>>, // key value -> ApiKey
}

impl ApiKeyStore {
    /// Create a new API key store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an API key
    pub fn add_key(&self, key: ApiKey) {
        self.keys.insert(key.key.clone(), key);
    }

    /// Validate an API key
    pub fn validate_key(&self, key_value: &str) -> Result<ApiKey> {
        let key = self
            .keys
            .get(key_value)
            .map(|k| k.clone())
            .ok_or_else(|| Error::Authentication("Invalid API key".to_string()))?;

        if !key.is_valid() {
            return Err(Error::Authentication(
                "API key is invalid or expired".to_string(),
            ));
        }

        Ok(key)
    }

    /// Revoke an API key
    pub fn revoke_key(&self, key_value: &str) -> Result<()> {
        if let Some(mut key) = self.keys.get_mut(key_value) {
            key.active = false;
            Ok(())
        } else {
            Err(Error::Authentication("API key not found".to_string()))
        }
    }

    /// Clean up expired keys
    pub fn cleanup_expired(&self) {
        self.keys.retain(|_, key| !key.is_expired());
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Authenticates requests carrying a key from an [`ApiKeyStore`]
#[derive(Debug, Clone)]
pub struct ApiKeyAuthenticator {
    store: ApiKeyStore,
    header: String,
}

impl ApiKeyAuthenticator {
    /// Read keys from the `X-API-Key` header
    pub fn new(store: ApiKeyStore) -> Self {
        Self::with_header(store, DEFAULT_API_KEY_HEADER)
    }

    /// Read keys from a custom header
    pub fn with_header(store: ApiKeyStore, header: impl Into<String>) -> Self {
        Self {
            store,
            header: header.into(),
        }
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, ctx: &Context) -> Result<Principal> {
        let value = extract_token(ctx, &self.header, "")
            .ok_or_else(|| Error::Authentication("Missing API key".to_string()))?;
        let key = self.store.validate_key(value)?;

        let mut principal = Principal::new(key.owner, self.name());
        principal.permissions = key.scopes;
        principal
            .claims
            .insert("key_id".to_string(), serde_json::Value::String(key.id));
        Ok(principal)
    }

    fn name(&self) -> &str {
        "api_key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use std::time::Duration;

    #[test]
    fn test_api_key_expiration() {
        let past = SystemTime::now() - Duration::from_secs(3600);
        let key = ApiKey::new("key-123", "secret-key", "user-456").expires_at(past);

        assert!(key.is_expired());
        assert!(!key.is_valid());
    }

    #[test]
    fn test_api_key_revoke() {
        let store = ApiKeyStore::new();
        store.add_key(ApiKey::new("key-123", "secret-key-xyz", "user-456"));
        assert!(store.validate_key("secret-key-xyz").is_ok());

        store.revoke_key("secret-key-xyz").unwrap();
        assert!(store.validate_key("secret-key-xyz").is_err());
        assert!(store.revoke_key("unknown").is_err());
    }

    #[test]
    fn test_cleanup_expired() {
        let store = ApiKeyStore::new();
        let past = SystemTime::now() - Duration::from_secs(1);
        store.add_key(ApiKey::new("k1", "v1", "o").expires_at(past));
        store.add_key(ApiKey::new("k2", "v2", "o"));

        store.cleanup_expired();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_authenticator_builds_principal() {
        let store = ApiKeyStore::new();
        store.add_key(ApiKey::new("key-1", "s3cret", "billing-svc").with_scope("invoices:read"));
        let auth = ApiKeyAuthenticator::new(store);

        let ctx = Context::from_request(
            Request::builder()
                .uri("/")
                .header("X-API-Key", "s3cret")
                .body(Bytes::new())
                .unwrap(),
        );
        let principal = auth.authenticate(&ctx).await.unwrap();
        assert_eq!(principal.subject, "billing-svc");
        assert_eq!(principal.provider, "api_key");
        assert_eq!(principal.permissions, vec!["invoices:read"]);
        assert_eq!(principal.claim("key_id").unwrap(), "key-1");

        let anonymous = Context::from_request(Request::builder().uri("/").body(Bytes::new()).unwrap());
        assert!(matches!(
            auth.authenticate(&anonymous).await,
            Err(Error::Authentication(_))
        ));
    }
}
