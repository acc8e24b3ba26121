//! Service-account credentials exchanged for short-lived bearer tokens.
//!
//! A signed RS256 assertion is posted to the key's token endpoint on every
//! call. Tokens are never cached between calls.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RemoteError};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const AUTH_SERVICE: &str = "Google OAuth";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a downloaded service-account JSON key that are used here
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let key: ServiceAccountKey =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidCredentials(e.to_string()))?;

        if key.client_email.trim().is_empty() {
            return Err(ConfigError::InvalidCredentials("client_email is empty".to_string()));
        }
        if key.private_key.trim().is_empty() {
            return Err(ConfigError::InvalidCredentials("private_key is empty".to_string()));
        }
        Ok(key)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Claims of the JWT bearer assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(key: &ServiceAccountKey, scope: &str, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            iss: key.client_email.clone(),
            scope: scope.to_string(),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// Sign an RS256 assertion for `scope`
pub fn sign_assertion(key: &ServiceAccountKey, scope: &str, now: DateTime<Utc>) -> Result<String, RemoteError> {
    let auth_error = |message: String| RemoteError::Auth {
        service: AUTH_SERVICE.to_string(),
        message,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| auth_error(format!("invalid private key: {}", e)))?;

    jsonwebtoken::encode(&header, &AssertionClaims::new(key, scope, now), &encoding_key)
        .map_err(|e| auth_error(format!("could not sign assertion: {}", e)))
}

/// Source of bearer tokens for Google Cloud APIs
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, scope: &str) -> Result<String, RemoteError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges a service-account key for access tokens over HTTPS
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    http: reqwest::Client,
    timeout: Duration,
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Self {
        Self {
            key,
            http: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn from_file(path: &Path, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self::new(ServiceAccountKey::from_file(path)?, timeout))
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self, scope: &str) -> Result<String, RemoteError> {
        let assertion = sign_assertion(&self.key, scope, Utc::now())?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .timeout(self.timeout)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(AUTH_SERVICE, &e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                // invalid_grant and friends come back as 400
                400 => RemoteError::Auth {
                    service: AUTH_SERVICE.to_string(),
                    message: format!("token exchange rejected: {}", body),
                },
                code => RemoteError::from_status(AUTH_SERVICE, code, body),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::malformed(AUTH_SERVICE, e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(RemoteError::malformed(AUTH_SERVICE, "empty access_token"));
        }

        debug!(
            "Obtained access token for {} (expires in {}s)",
            scope,
            token.expires_in.unwrap_or_default()
        );
        Ok(token.access_token)
    }
}

/// Stand-in used when no service account is configured; every request fails
/// with an auth error so callers take their fallback path.
#[derive(Debug, Clone)]
pub struct MissingCredentials {
    reason: String,
}

impl MissingCredentials {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl TokenProvider for MissingCredentials {
    async fn access_token(&self, _scope: &str) -> Result<String, RemoteError> {
        Err(RemoteError::Auth {
            service: AUTH_SERVICE.to_string(),
            message: self.reason.clone(),
        })
    }
}
