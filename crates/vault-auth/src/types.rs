//! Credential types and the validated result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_core::Principal;

/// Types of credentials that can be validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    /// API key from the `api-key` header
    ApiKey,
    /// Session token from `Authorization: Bearer`
    Session,
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialType::ApiKey => write!(f, "apikey"),
            CredentialType::Session => write!(f, "session"),
        }
    }
}

impl std::str::FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apikey" | "api_key" | "api-key" => Ok(CredentialType::ApiKey),
            "session" | "bearer" => Ok(CredentialType::Session),
            _ => Err(format!("Unknown credential type: {}", s)),
        }
    }
}

/// Raw credentials pulled off a request
#[derive(Clone, Default)]
pub struct Credentials {
    /// Value of the `api-key` header
    pub api_key: Option<String>,
    /// Value of the `user` header, checked against the key owner
    pub user: Option<String>,
    /// Bearer token from the `Authorization` header
    pub bearer: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("user", &self.user)
            .field("bearer", &self.bearer.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl Credentials {
    /// Credentials carrying only an API key
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Credentials carrying only a session token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            ..Self::default()
        }
    }

    /// Add the `user` cross-check
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// The credential to validate and its type; a bearer token wins over an API key
    pub fn primary(&self) -> Option<(&str, CredentialType)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }

        non_empty(&self.bearer)
            .map(|t| (t, CredentialType::Session))
            .or_else(|| non_empty(&self.api_key).map(|k| (k, CredentialType::ApiKey)))
    }
}

/// A validated credential with the principal it resolved to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedCredential {
    /// The resolved principal
    pub principal: Principal,

    /// How the principal authenticated
    pub credential_type: CredentialType,

    /// When the credential expires (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidatedCredential {
    /// Create a new validated credential
    pub fn new(principal: Principal, credential_type: CredentialType) -> Self {
        Self {
            principal,
            credential_type,
            expires_at: None,
        }
    }

    /// Set expiration time
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the request came in through an API key
    pub fn is_api_call(&self) -> bool {
        self.credential_type == CredentialType::ApiKey
    }

    /// Check if the credential is expired
    pub fn is_expired(&self) -> bool {
        if let Some(exp) = self.expires_at {
            exp < Utc::now()
        } else {
            false
        }
    }
}
