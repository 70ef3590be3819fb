//! Keypair store
//!
//! Lifecycle of an account's signing keys: created (generated or imported)
//! disabled, enabled for signing, optionally registered with the external
//! store. Keys are never deleted.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use vault_core::{Action, KeyPair};

use super::registrar::{RegistrationResult, StoreCredentials, StoreRegistrar};
use crate::core::{authorize, PermissionDenied, RequestContext};
use crate::storage::{Account, Datastore, Keypair, NewKeypair, StorageError};

/// Errors from keypair management
#[derive(Error, Debug)]
pub enum KeypairError {
    #[error(transparent)]
    Denied(#[from] PermissionDenied),

    #[error("A keypair named '{name}' already exists for '{authority}'")]
    KeyExists { authority: String, name: String },

    #[error("No account for authority '{0}'")]
    AccountNotFound(String),

    #[error("Keypair not found")]
    NotFound,

    #[error("Invalid key material: {0}")]
    InvalidMaterial(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where the signing key comes from
pub enum KeyMaterial {
    Generate,
    /// 32-byte Ed25519 seed
    Import(Vec<u8>),
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterial::Generate => f.write_str("Generate"),
            KeyMaterial::Import(_) => f.write_str("Import([redacted])"),
        }
    }
}

/// Lifecycle state of a keypair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeypairStatus {
    Pending,
    Enabled,
    Disabled,
    Registered,
}

impl KeypairStatus {
    fn of(keypair: &Keypair) -> Self {
        if keypair.registered {
            KeypairStatus::Registered
        } else if keypair.active {
            KeypairStatus::Enabled
        } else {
            KeypairStatus::Disabled
        }
    }
}

/// Keypair as shown to callers; never carries key material
#[derive(Debug, Clone, Serialize)]
pub struct KeypairInfo {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "AuthorityID")]
    pub authority_id: String,
    #[serde(rename = "KeyName")]
    pub key_name: String,
    #[serde(rename = "KeyID")]
    pub key_id: String,
    #[serde(rename = "PublicKey")]
    pub public_key: String,
    #[serde(rename = "Active")]
    pub active: bool,
    #[serde(rename = "Registered")]
    pub registered: bool,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

impl From<&Keypair> for KeypairInfo {
    fn from(keypair: &Keypair) -> Self {
        Self {
            id: keypair.id,
            authority_id: keypair.authority_id.clone(),
            key_name: keypair.key_name.clone(),
            key_id: keypair.key_id.clone(),
            public_key: STANDARD.encode(&keypair.public_key),
            active: keypair.active,
            registered: keypair.registered,
            created_at: keypair.created_at,
        }
    }
}

/// Account-scoped keypair management
#[derive(Debug)]
pub struct KeypairStore {
    store: Arc<dyn Datastore>,
    registrar: Arc<dyn StoreRegistrar>,
}

impl KeypairStore {
    pub fn new(store: Arc<dyn Datastore>, registrar: Arc<dyn StoreRegistrar>) -> Self {
        Self { store, registrar }
    }

    async fn account_for(&self, authority_id: &str) -> Result<Account, KeypairError> {
        self.store
            .get_account_by_authority(authority_id)
            .await?
            .ok_or_else(|| KeypairError::AccountNotFound(authority_id.to_string()))
    }

    /// Load a keypair and check the principal may act on it
    async fn authorized_keypair(
        &self,
        ctx: &RequestContext,
        id: i64,
        action: Action,
    ) -> Result<Keypair, KeypairError> {
        let keypair = self.store.get_keypair(id).await?.ok_or(KeypairError::NotFound)?;
        let account = self.account_for(&keypair.authority_id).await?;
        authorize(&ctx.principal, action, account.id)?;
        Ok(keypair)
    }

    /// Create a keypair for an authority; it is stored disabled
    pub async fn create(
        &self,
        ctx: &RequestContext,
        authority_id: &str,
        key_name: &str,
        material: KeyMaterial,
    ) -> Result<Keypair, KeypairError> {
        let account = self.account_for(authority_id).await?;
        authorize(&ctx.principal, Action::ManageKeypairs, account.id)?;

        if key_name.trim().is_empty() {
            return Err(KeypairError::InvalidMaterial("The key name must be entered".into()));
        }

        let exists = || KeypairError::KeyExists {
            authority: authority_id.to_string(),
            name: key_name.to_string(),
        };

        if self.store.find_keypair(authority_id, key_name).await?.is_some() {
            return Err(exists());
        }
        if !self.store.mark_keypair_pending(authority_id, key_name).await? {
            return Err(exists());
        }

        let result = self.build_and_store(authority_id, key_name, material).await;

        if let Err(e) = self.store.clear_keypair_pending(authority_id, key_name).await {
            error!(authority = %authority_id, key_name = %key_name, error = %e, "Failed to clear pending keypair marker");
        }

        let keypair = result.map_err(|e| match e {
            KeypairError::Storage(StorageError::AlreadyExists(_)) => exists(),
            other => other,
        })?;

        info!(
            id = keypair.id,
            key_id = %keypair.key_id,
            authority = %authority_id,
            principal = %ctx.principal.identity,
            "Keypair created"
        );
        Ok(keypair)
    }

    async fn build_and_store(
        &self,
        authority_id: &str,
        key_name: &str,
        material: KeyMaterial,
    ) -> Result<Keypair, KeypairError> {
        let key_pair = match material {
            KeyMaterial::Generate => tokio::task::spawn_blocking(KeyPair::generate)
                .await
                .map_err(|e| KeypairError::Internal(e.to_string()))?,
            KeyMaterial::Import(seed) => {
                KeyPair::from_seed(&seed).map_err(|e| KeypairError::InvalidMaterial(e.to_string()))?
            }
        };

        Ok(self
            .store
            .create_keypair(NewKeypair::from_key_pair(authority_id, key_name, &key_pair))
            .await?)
    }

    /// Enable a keypair for signing; idempotent
    pub async fn enable(&self, ctx: &RequestContext, id: i64) -> Result<Keypair, KeypairError> {
        self.set_active(ctx, id, true).await
    }

    /// Disable a keypair; later signs with it fail. Idempotent
    pub async fn disable(&self, ctx: &RequestContext, id: i64) -> Result<Keypair, KeypairError> {
        self.set_active(ctx, id, false).await
    }

    async fn set_active(&self, ctx: &RequestContext, id: i64, active: bool) -> Result<Keypair, KeypairError> {
        let keypair = self.authorized_keypair(ctx, id, Action::ManageKeypairs).await?;
        if keypair.active == active {
            return Ok(keypair);
        }

        let keypair = self.store.set_keypair_active(id, active).await?;
        info!(id, active, principal = %ctx.principal.identity, "Keypair state changed");
        Ok(keypair)
    }

    /// Register a keypair's public key with the external store
    pub async fn register_with_external_store(
        &self,
        ctx: &RequestContext,
        id: i64,
        credentials: &StoreCredentials,
    ) -> Result<RegistrationResult, KeypairError> {
        let keypair = self.authorized_keypair(ctx, id, Action::ManageKeypairs).await?;

        let result = self
            .registrar
            .register(&keypair, credentials)
            .await
            .map_err(|e| {
                warn!(id, error = %e, "Keypair registration failed");
                KeypairError::Registration(e.to_string())
            })?;

        self.store.mark_keypair_registered(id).await?;
        Ok(result)
    }

    /// Lifecycle state of an authority's named key
    pub async fn status_of(
        &self,
        ctx: &RequestContext,
        authority_id: &str,
        key_name: &str,
    ) -> Result<KeypairStatus, KeypairError> {
        let account = self.account_for(authority_id).await?;
        authorize(&ctx.principal, Action::ReadKeypairs, account.id)?;

        if let Some(keypair) = self.store.find_keypair(authority_id, key_name).await? {
            return Ok(KeypairStatus::of(&keypair));
        }
        if self.store.is_keypair_pending(authority_id, key_name).await? {
            return Ok(KeypairStatus::Pending);
        }
        Err(KeypairError::NotFound)
    }

    /// Keypairs of the authorities the principal may act for
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<Keypair>, KeypairError> {
        let keypairs = self.store.list_keypairs().await?;
        if ctx.principal.is_superuser() {
            return Ok(keypairs);
        }

        let authorities: HashSet<String> = self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| authorize(&ctx.principal, Action::ReadKeypairs, a.id).is_ok())
            .map(|a| a.authority_id)
            .collect();

        Ok(keypairs
            .into_iter()
            .filter(|k| authorities.contains(&k.authority_id))
            .collect())
    }
}
