//! Sub-store resolution and management
//!
//! A sub-store binds a model, when published to a named store, to a keypair
//! other than the account default. Resolution picks the keypair and signing
//! policy for a sign request; management is account-scoped and gated by the
//! permission evaluator before any write.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use vault_core::Action;

use super::permissions::{authorize, authorize_role, PermissionDenied};
use super::RequestContext;
use crate::storage::{Account, Datastore, Keypair, StorageError, Substore};

/// Errors from sub-store resolution and management
#[derive(Error, Debug)]
pub enum SubstoreError {
    #[error(transparent)]
    Denied(#[from] PermissionDenied),

    /// Invalid sub-store data or no usable keypair
    #[error("{0}")]
    StoresJson(String),

    /// The update could not be stored
    #[error("{0}")]
    Substore(String),

    /// The delete failed; `subcode` says why
    #[error("{message}")]
    Deleting { subcode: &'static str, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How an assertion is to be signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPolicy {
    /// Store the assertion is published to, for pivoted assertions
    pub store: Option<String>,
    /// Model name to put in the assertion
    pub model_name: String,
    /// Sub-store that selected the keypair
    pub substore_id: Option<i64>,
}

impl SigningPolicy {
    /// Whether a sub-store redirected the request
    pub fn is_pivot(&self) -> bool {
        self.substore_id.is_some()
    }
}

/// A keypair together with the policy to apply
#[derive(Debug, Clone)]
pub struct Resolution {
    pub account: Account,
    pub keypair: Keypair,
    pub policy: SigningPolicy,
}

/// Maps (account, model, store) to the keypair and policy to sign with
#[derive(Debug)]
pub struct SubstoreResolver {
    store: Arc<dyn Datastore>,
}

impl SubstoreResolver {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Pick the keypair for a sign request
    ///
    /// A sub-store for (account, store, model) wins over the account default.
    /// Its keypair must belong to the account's authority and be registered
    /// with the store, since the assertion is published there.
    pub async fn resolve(
        &self,
        account_id: i64,
        model: &str,
        requested_store: Option<&str>,
    ) -> Result<Resolution, SubstoreError> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(SubstoreError::AccountNotFound(account_id))?;

        if let Some(requested) = requested_store.filter(|s| !s.is_empty()) {
            if let Some(sub) = self.store.find_substore(account_id, requested, model).await? {
                return self.resolve_substore(account, sub).await;
            }
        }

        let keypair_id = account.default_keypair_id.ok_or_else(|| {
            SubstoreError::StoresJson(format!(
                "Account '{}' has no default keypair",
                account.authority_id
            ))
        })?;
        let keypair = self.store.get_keypair(keypair_id).await?.ok_or_else(|| {
            SubstoreError::StoresJson(format!("Default keypair {} not found", keypair_id))
        })?;

        Ok(Resolution {
            account,
            keypair,
            policy: SigningPolicy {
                store: None,
                model_name: model.to_string(),
                substore_id: None,
            },
        })
    }

    async fn resolve_substore(&self, account: Account, sub: Substore) -> Result<Resolution, SubstoreError> {
        if sub.account_id != account.id {
            warn!(substore = sub.id, owner = sub.account_id, requested = account.id, "SECURITY: Sub-store account mismatch");
            return Err(SubstoreError::StoresJson(
                "The sub-store does not belong to the account".into(),
            ));
        }

        let keypair = self
            .store
            .get_keypair(sub.keypair_id)
            .await?
            .ok_or_else(|| SubstoreError::StoresJson(format!("Keypair {} not found", sub.keypair_id)))?;

        if keypair.authority_id != account.authority_id {
            warn!(substore = sub.id, keypair = keypair.id, "SECURITY: Sub-store keypair from another authority");
            return Err(SubstoreError::StoresJson(
                "The sub-store keypair does not belong to the account".into(),
            ));
        }
        if !keypair.registered {
            return Err(SubstoreError::StoresJson(format!(
                "Keypair '{}' is not registered with the store",
                keypair.key_name
            )));
        }

        Ok(Resolution {
            account,
            keypair,
            policy: SigningPolicy {
                store: Some(sub.store),
                model_name: sub.model_name,
                substore_id: Some(sub.id),
            },
        })
    }

    /// Sub-stores of an account
    pub async fn list(&self, ctx: &RequestContext, account_id: i64) -> Result<Vec<Substore>, SubstoreError> {
        authorize(&ctx.principal, Action::ReadSubstores, account_id)?;
        Ok(self.store.list_substores(account_id, &ctx.principal).await?)
    }

    /// Create a sub-store under the account named in the payload
    pub async fn create(&self, ctx: &RequestContext, store: Substore) -> Result<Substore, SubstoreError> {
        authorize(&ctx.principal, Action::ManageSubstores, store.account_id)?;
        self.validate(&store).await?;

        self.store
            .create_substore(store, &ctx.principal)
            .await
            .map_err(|e| match e {
                StorageError::Forbidden(_) => SubstoreError::Denied(PermissionDenied {
                    identity: ctx.principal.identity.clone(),
                    action: Action::ManageSubstores,
                    account_id: None,
                    reason: super::permissions::DenialReason::NotAMember,
                }),
                StorageError::AlreadyExists(what) => {
                    SubstoreError::StoresJson(format!("Sub-store '{}' already exists", what))
                }
                other => SubstoreError::Storage(other),
            })
    }

    /// Update a sub-store; `path_id` must match the payload's ID
    pub async fn update(
        &self,
        ctx: &RequestContext,
        path_id: i64,
        store: Substore,
    ) -> Result<Substore, SubstoreError> {
        authorize(&ctx.principal, Action::ManageSubstores, store.account_id)?;

        if path_id != store.id {
            return Err(SubstoreError::StoresJson("The store IDs do not match".into()));
        }

        let existing = self
            .store
            .get_substore(store.id)
            .await?
            .ok_or_else(|| SubstoreError::Substore("Error updating the store".into()))?;
        authorize(&ctx.principal, Action::ManageSubstores, existing.account_id)?;
        if existing.account_id != store.account_id {
            warn!(
                id = store.id,
                owner = existing.account_id,
                claimed = store.account_id,
                principal = %ctx.principal.identity,
                "SECURITY: Sub-store update for another account's row"
            );
            return Err(SubstoreError::Denied(PermissionDenied {
                identity: ctx.principal.identity.clone(),
                action: Action::ManageSubstores,
                account_id: Some(existing.account_id),
                reason: super::permissions::DenialReason::NotAMember,
            }));
        }

        self.validate(&store).await?;

        match self.store.update_substore(store, &ctx.principal).await {
            Ok(updated) => Ok(updated),
            Err(StorageError::Forbidden(_)) => Err(SubstoreError::Denied(PermissionDenied {
                identity: ctx.principal.identity.clone(),
                action: Action::ManageSubstores,
                account_id: Some(existing.account_id),
                reason: super::permissions::DenialReason::NotAMember,
            })),
            Err(e) => {
                warn!(id = path_id, error = %e, "Error updating the store");
                Err(SubstoreError::Substore("Error updating the store".into()))
            }
        }
    }

    /// Delete a sub-store
    ///
    /// The owning account is authorized before the delete; the datastore
    /// re-checks ownership inside the delete itself. Other failures are
    /// reported as a sub-code.
    pub async fn delete(&self, ctx: &RequestContext, id: i64) -> Result<(), SubstoreError> {
        authorize_role(&ctx.principal, Action::ManageSubstores)?;

        let existing = self.store.get_substore(id).await?.ok_or_else(|| {
            warn!(id, "Sub-store delete failed: not found");
            SubstoreError::Deleting {
                subcode: "error-store-not-found",
                message: "Cannot find the sub-store".into(),
            }
        })?;
        authorize(&ctx.principal, Action::ManageSubstores, existing.account_id)?;

        self.store
            .delete_substore(id, &ctx.principal)
            .await
            .map_err(|e| {
                let subcode = e.subcode();
                let message = match &e {
                    StorageError::NotFound(_) => "Cannot find the sub-store".to_string(),
                    StorageError::InUse(_) => "The sub-store is referenced by the signing log".to_string(),
                    StorageError::Forbidden(_) => "The sub-store belongs to another account".to_string(),
                    _ => "Error deleting the sub-store".to_string(),
                };
                warn!(id, subcode, error = %e, "Sub-store delete failed");
                SubstoreError::Deleting { subcode, message }
            })?;

        info!(id, principal = %ctx.principal.identity, "Sub-store deleted");
        Ok(())
    }

    /// Check the payload against the account it names
    async fn validate(&self, store: &Substore) -> Result<(), SubstoreError> {
        if store.store.trim().is_empty() {
            return Err(SubstoreError::StoresJson("The store name must be entered".into()));
        }
        if store.from_model.trim().is_empty() || store.model_name.trim().is_empty() {
            return Err(SubstoreError::StoresJson("The model names must be entered".into()));
        }

        let account = self
            .store
            .get_account(store.account_id)
            .await?
            .ok_or(SubstoreError::AccountNotFound(store.account_id))?;

        let keypair = self
            .store
            .get_keypair(store.keypair_id)
            .await?
            .ok_or_else(|| SubstoreError::StoresJson(format!("Keypair {} not found", store.keypair_id)))?;
        if keypair.authority_id != account.authority_id {
            return Err(SubstoreError::StoresJson(
                "The keypair does not belong to the account".into(),
            ));
        }

        Ok(())
    }
}
