//! Session Token Credential Handler
//!
//! Issues and validates HS256 session tokens for interactive users. The token
//! only carries the username; role and accounts are looked up on every
//! request so that revoking access takes effect immediately.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use vault_core::Principal;

use crate::authenticator::CredentialHandler;
use crate::error::{AuthError, Result};
use crate::types::{CredentialType, ValidatedCredential};

/// Issuer claim stamped on every session token
pub const SESSION_ISSUER: &str = "serial-vault";

/// Source of user principals for session tokens
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a username to a principal, or `None` if the user does not exist
    async fn find_user(&self, username: &str) -> Result<Option<Principal>>;
}

#[async_trait]
impl<D: UserDirectory + ?Sized> UserDirectory for Arc<D> {
    async fn find_user(&self, username: &str) -> Result<Option<Principal>> {
        (**self).find_user(username).await
    }
}

/// Claims of a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// Session Token Credential Handler
pub struct SessionHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    directory: Box<dyn UserDirectory>,
}

impl SessionHandler {
    /// Create a handler signing with the given HS256 secret
    pub fn new<D: UserDirectory + 'static>(secret: &[u8], ttl: Duration, directory: D) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
            directory: Box::new(directory),
        }
    }

    /// Issue a session token for a user, valid from `now` for the configured TTL
    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = SessionClaims {
            sub: username.to_string(),
            iss: SESSION_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(AuthError::from)
    }

    fn decode_claims(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[async_trait]
impl CredentialHandler for SessionHandler {
    fn credential_type(&self) -> CredentialType {
        CredentialType::Session
    }

    fn description(&self) -> &str {
        "session token handler"
    }

    async fn validate(&self, credential: &str) -> Result<ValidatedCredential> {
        let claims = self.decode_claims(credential)?;
        debug!(user = %claims.sub, "Session token decoded");

        let principal = self
            .directory
            .find_user(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::UnknownUser(claims.sub.clone()))?;

        let mut validated = ValidatedCredential::new(principal, CredentialType::Session);
        if let Some(exp) = Utc.timestamp_opt(claims.exp, 0).single() {
            validated = validated.with_expires_at(exp);
        }

        Ok(validated)
    }
}
