//! API Key Credential Handler
//!
//! Validates API keys against a backend (in-memory, or the vault datastore)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;
use vault_core::{Principal, Role};

use crate::authenticator::CredentialHandler;
use crate::error::{AuthError, Result};
use crate::types::{CredentialType, ValidatedCredential};

/// Information about a validated API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyInfo {
    /// Unique identifier for the key
    pub key_id: String,

    /// Username of the key owner
    pub owner: String,

    /// Role of the owner
    pub role: Role,

    /// Accounts the key may act for
    #[serde(default)]
    pub accounts: BTreeSet<i64>,

    /// When the key expires (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the key is active
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl ApiKeyInfo {
    /// Create a new API key info
    pub fn new(key_id: impl Into<String>, owner: impl Into<String>, role: Role) -> Self {
        Self {
            key_id: key_id.into(),
            owner: owner.into(),
            role,
            accounts: BTreeSet::new(),
            expires_at: None,
            active: true,
        }
    }

    /// Set the bound accounts
    pub fn with_accounts(mut self, accounts: impl IntoIterator<Item = i64>) -> Self {
        self.accounts = accounts.into_iter().collect();
        self
    }

    /// Set expiration
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Backend trait for API key validation
///
/// Implement this trait to integrate with different key storage systems.
#[async_trait]
pub trait ApiKeyBackend: Send + Sync {
    /// Look up an API key; inactive or expired keys are still returned
    async fn lookup(&self, api_key: &str) -> Result<ApiKeyInfo>;

    /// Get a description of this backend
    fn description(&self) -> &str {
        "API key backend"
    }
}

#[async_trait]
impl<B: ApiKeyBackend + ?Sized> ApiKeyBackend for Arc<B> {
    async fn lookup(&self, api_key: &str) -> Result<ApiKeyInfo> {
        (**self).lookup(api_key).await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// In-memory API key backend
///
/// Stores API keys in memory. Useful for development and testing.
#[derive(Default)]
pub struct InMemoryApiKeyBackend {
    keys: RwLock<HashMap<String, ApiKeyInfo>>,
}

impl InMemoryApiKeyBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an API key
    pub fn register_key(&self, api_key: impl Into<String>, info: ApiKeyInfo) -> Result<()> {
        let mut keys = self.keys.write().map_err(poisoned)?;
        keys.insert(api_key.into(), info);
        Ok(())
    }

    /// Revoke an API key
    pub fn revoke_key(&self, api_key: &str) -> Result<bool> {
        let mut keys = self.keys.write().map_err(poisoned)?;
        Ok(match keys.get_mut(api_key) {
            Some(info) => {
                info.active = false;
                true
            }
            None => false,
        })
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AuthError {
    AuthError::Backend("api key table lock poisoned".into())
}

#[async_trait]
impl ApiKeyBackend for InMemoryApiKeyBackend {
    async fn lookup(&self, api_key: &str) -> Result<ApiKeyInfo> {
        let keys = self.keys.read().map_err(poisoned)?;
        keys.get(api_key).cloned().ok_or(AuthError::ApiKeyNotFound)
    }

    fn description(&self) -> &str {
        "in-memory API key backend"
    }
}

/// API Key Credential Handler
pub struct ApiKeyHandler {
    backend: Box<dyn ApiKeyBackend>,
}

impl ApiKeyHandler {
    /// Create a new API key handler with the given backend
    pub fn new<B: ApiKeyBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }
}

#[async_trait]
impl CredentialHandler for ApiKeyHandler {
    fn credential_type(&self) -> CredentialType {
        CredentialType::ApiKey
    }

    fn description(&self) -> &str {
        "API key handler"
    }

    async fn validate(&self, credential: &str) -> Result<ValidatedCredential> {
        debug!(backend = self.backend.description(), "Validating API key");

        let info = self.backend.lookup(credential).await?;

        if !info.active {
            return Err(AuthError::ApiKeyRevoked);
        }

        if let Some(exp) = info.expires_at {
            if exp < Utc::now() {
                return Err(AuthError::Expired(exp.to_rfc3339()));
            }
        }

        let principal = Principal::api_key(info.owner, info.role).with_accounts(info.accounts);

        let mut validated = ValidatedCredential::new(principal, CredentialType::ApiKey);
        if let Some(exp) = info.expires_at {
            validated = validated.with_expires_at(exp);
        }

        Ok(validated)
    }
}
