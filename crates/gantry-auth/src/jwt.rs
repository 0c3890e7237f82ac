//! JWT authentication
//!
//! Validates JSON Web Tokens carried in the `Authorization` header and turns
//! their claims into a [`Principal`]. HMAC (HS*), RSA (RS*/PS*), ECDSA (ES*)
//! and EdDSA keys are supported.

use crate::authenticator::{extract_token, Authenticator};
use async_trait::async_trait;
use gantry_core::{Context, Error, Principal, Result};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Secrets shorter than this are accepted with a warning
pub const MIN_RECOMMENDED_SECRET_LEN: usize = 32;

/// JWT configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Secret key for HMAC algorithms (HS256, HS384, HS512)
    pub secret: Option<String>,

    /// PEM public key for RSA/ECDSA/EdDSA algorithms
    pub public_key: Option<String>,

    /// Algorithm to use for validation
    pub algorithm: Algorithm,

    /// Header name to extract JWT from
    pub header_name: String,

    /// Token prefix
    pub token_prefix: String,

    /// Required audience ("aud" claim)
    pub audience: Option<String>,

    /// Required issuer ("iss" claim)
    pub issuer: Option<String>,

    /// Clock skew tolerance in seconds
    pub leeway: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            public_key: None,
            algorithm: Algorithm::HS256,
            header_name: "authorization".to_string(),
            token_prefix: "Bearer ".to_string(),
            audience: None,
            issuer: None,
            leeway: 60,
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithm", &self.algorithm)
            .field("header_name", &self.header_name)
            .field("token_prefix", &self.token_prefix)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .field("has_secret", &self.secret.is_some())
            .field("has_public_key", &self.public_key.is_some())
            .finish()
    }
}

impl JwtConfig {
    /// HS256 config with a shared secret
    pub fn hmac(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Check key material against the algorithm
    pub fn validate(&self) -> Result<()> {
        match (&self.secret, &self.public_key) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "jwt: set either secret or public_key, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(Error::Config(
                    "jwt: either secret or public_key must be provided".to_string(),
                ))
            }
            _ => {}
        }

        let is_hmac = matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        );
        if let Some(secret) = &self.secret {
            if !is_hmac {
                return Err(Error::Config(format!(
                    "jwt: algorithm {:?} needs a public_key, not a secret",
                    self.algorithm
                )));
            }
            if secret.is_empty() {
                return Err(Error::Config("jwt: secret must not be empty".to_string()));
            }
            if secret.len() < MIN_RECOMMENDED_SECRET_LEN {
                tracing::warn!(
                    len = secret.len(),
                    recommended = MIN_RECOMMENDED_SECRET_LEN,
                    "JWT secret is shorter than recommended"
                );
            }
        } else if is_hmac {
            return Err(Error::Config(format!(
                "jwt: algorithm {:?} needs a secret, not a public_key",
                self.algorithm
            )));
        }

        if self.header_name.trim().is_empty() {
            return Err(Error::Config("jwt: header_name must not be empty".to_string()));
        }

        Ok(())
    }

    fn decoding_key(&self) -> Result<DecodingKey> {
        if let Some(secret) = &self.secret {
            return Ok(DecodingKey::from_secret(secret.as_bytes()));
        }

        let pem = self
            .public_key
            .as_deref()
            .ok_or_else(|| Error::Config("jwt: public_key missing".to_string()))?
            .as_bytes();

        let key = match self.algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            other => {
                return Err(Error::Config(format!(
                    "jwt: unsupported algorithm for public key: {other:?}"
                )))
            }
        };

        key.map_err(|e| Error::Config(format!("jwt: invalid public key: {e}")))
    }
}

/// Claims read from a token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: u64,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience, a string or a list of strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    /// Role names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Permissions (`resource:action`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    /// Everything else
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl Claims {
    fn into_principal(self) -> Principal {
        let mut principal = Principal::new(self.sub, "jwt");
        principal.roles = self.roles;
        principal.permissions = self.permissions;
        principal.claims = self.custom;
        if let Some(iss) = self.iss {
            principal
                .claims
                .insert("iss".to_string(), serde_json::Value::String(iss));
        }
        principal
            .claims
            .insert("exp".to_string(), serde_json::Value::from(self.exp));
        principal
    }
}

/// Authenticates `Authorization: Bearer <jwt>` requests
#[derive(Clone)]
pub struct JwtAuthenticator {
    config: Arc<JwtConfig>,
    validation: Validation,
    decoding_key: Arc<DecodingKey>,
}

impl JwtAuthenticator {
    /// HS256 authenticator with a shared secret
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        Self::with_config(JwtConfig::hmac(secret))
    }

    /// Authenticator from a full config
    pub fn with_config(config: JwtConfig) -> Result<Self> {
        config.validate()?;
        let decoding_key = config.decoding_key()?;

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = config.leeway;
        match config.audience {
            Some(ref aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(ref iss) = config.issuer {
            validation.set_issuer(&[iss]);
        }

        Ok(Self {
            config: Arc::new(config),
            validation,
            decoding_key: Arc::new(decoding_key),
        })
    }

    /// Decode and validate a raw token
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let message = match e.kind() {
                    ErrorKind::ExpiredSignature => "Token has expired",
                    ErrorKind::ImmatureSignature => "Token is not yet valid",
                    ErrorKind::InvalidToken => "Invalid token format",
                    ErrorKind::InvalidSignature => "Invalid token signature",
                    ErrorKind::InvalidIssuer => "Invalid token issuer",
                    ErrorKind::InvalidAudience => "Invalid token audience",
                    ErrorKind::InvalidAlgorithm => "Invalid token algorithm",
                    _ => "Token validation failed",
                };
                tracing::debug!(error = %e, "JWT validation failed");
                Error::Authentication(message.to_string())
            })
    }
}

impl fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, ctx: &Context) -> Result<Principal> {
        let token = extract_token(ctx, &self.config.header_name, &self.config.token_prefix)
            .ok_or_else(|| Error::Authentication("Missing authentication token".to_string()))?;

        let claims = self.verify(token)?;
        tracing::debug!(sub = %claims.sub, "JWT authentication successful");
        Ok(claims.into_principal())
    }

    fn name(&self) -> &str {
        "jwt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "a-test-secret-that-is-long-enough-32";

    fn create_test_token(secret: &str, exp_offset: i64, extra: serde_json::Value) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let mut claims = serde_json::json!({
            "sub": "test-user",
            "exp": (now as i64 + exp_offset) as u64,
            "iat": now,
        });
        if let (Some(map), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
            map.extend(extra.clone());
        }

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn ctx_with_auth(value: Option<String>) -> Context {
        let mut builder = Request::builder().uri("/protected");
        if let Some(value) = value {
            builder = builder.header("Authorization", value);
        }
        Context::from_request(builder.body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn test_jwt_success_maps_claims() {
        let auth = JwtAuthenticator::new(SECRET).unwrap();
        let token = create_test_token(
            SECRET,
            3600,
            serde_json::json!({
                "roles": ["editor"],
                "permissions": ["posts:write"],
                "tenant": "acme",
            }),
        );

        let principal = auth
            .authenticate(&ctx_with_auth(Some(format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(principal.subject, "test-user");
        assert_eq!(principal.provider, "jwt");
        assert_eq!(principal.roles, vec!["editor"]);
        assert_eq!(principal.permissions, vec!["posts:write"]);
        assert_eq!(principal.claim("tenant").unwrap(), "acme");
    }

    #[tokio::test]
    async fn test_jwt_missing_token() {
        let auth = JwtAuthenticator::new(SECRET).unwrap();
        let err = auth.authenticate(&ctx_with_auth(None)).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_jwt_invalid_expired_and_wrong_secret() {
        let auth = JwtAuthenticator::new(SECRET).unwrap();

        let invalid = auth
            .authenticate(&ctx_with_auth(Some("Bearer invalid-token".to_string())))
            .await;
        assert!(matches!(invalid, Err(Error::Authentication(_))));

        let expired = create_test_token(SECRET, -3600, serde_json::json!({}));
        match auth
            .authenticate(&ctx_with_auth(Some(format!("Bearer {expired}"))))
            .await
        {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "Token has expired"),
            other => panic!("expected expiry error, got {other:?}"),
        }

        let forged = create_test_token("some-other-secret-of-enough-length", 3600, serde_json::json!({}));
        match auth
            .authenticate(&ctx_with_auth(Some(format!("Bearer {forged}"))))
            .await
        {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "Invalid token signature"),
            other => panic!("expected signature error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_jwt_issuer_and_audience() {
        let auth = JwtAuthenticator::with_config(JwtConfig {
            issuer: Some("gantry-tests".to_string()),
            audience: Some("api".to_string()),
            ..JwtConfig::hmac(SECRET)
        })
        .unwrap();

        let good = create_test_token(
            SECRET,
            3600,
            serde_json::json!({ "iss": "gantry-tests", "aud": "api" }),
        );
        assert!(auth
            .authenticate(&ctx_with_auth(Some(format!("Bearer {good}"))))
            .await
            .is_ok());

        let wrong_iss = create_test_token(
            SECRET,
            3600,
            serde_json::json!({ "iss": "elsewhere", "aud": "api" }),
        );
        assert!(auth
            .authenticate(&ctx_with_auth(Some(format!("Bearer {wrong_iss}"))))
            .await
            .is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(JwtConfig::default().validate().is_err());
        assert!(JwtConfig::hmac("").validate().is_err());
        assert!(JwtConfig::hmac("short").validate().is_ok());

        let both = JwtConfig {
            public_key: Some("pem".to_string()),
            ..JwtConfig::hmac(SECRET)
        };
        assert!(both.validate().is_err());

        let rsa_with_secret = JwtConfig {
            algorithm: Algorithm::RS256,
            ..JwtConfig::hmac(SECRET)
        };
        assert!(rsa_with_secret.validate().is_err());

        let hmac_with_key = JwtConfig {
            public_key: Some("pem".to_string()),
            ..Default::default()
        };
        assert!(hmac_with_key.validate().is_err());

        let bad_pem = JwtConfig {
            public_key: Some("not a pem".to_string()),
            algorithm: Algorithm::RS256,
            ..Default::default()
        };
        assert!(matches!(
            JwtAuthenticator::with_config(bad_pem),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_config_deserializes() {
        let config: JwtConfig =
            serde_json::from_str(r#"{"secret":"s","algorithm":"HS512","issuer":"me"}"#).unwrap();
        assert_eq!(config.algorithm, Algorithm::HS512);
        assert_eq!(config.token_prefix, "Bearer ");
        assert_eq!(config.issuer.as_deref(), Some("me"));
    }
}
