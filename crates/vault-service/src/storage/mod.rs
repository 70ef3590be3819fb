//! Storage abstraction for the serial vault
//!
//! This module provides a trait-based abstraction over the vault datastore,
//! with an in-memory backend (default) and a PostgreSQL backend behind the
//! `postgres` feature.
//!
//! Operations that must be atomic (nonce redemption, sub-store update and
//! delete) are atomic inside a single backend call: one write-lock critical
//! section in memory, one SQL statement in PostgreSQL.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;
use vault_core::{AssertionKind, KeyPair, Principal, Role};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Owned by another account: {0}")]
    Forbidden(String),

    #[error("Still referenced: {0}")]
    InUse(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl StorageError {
    /// Structured sub-code reported to API callers for sub-store deletion
    pub fn subcode(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "error-store-not-found",
            StorageError::InUse(_) => "error-store-in-use",
            StorageError::Forbidden(_) => "error-auth",
            _ => "error-store-storage",
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A signing authority (brand account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Brand identifier, unique across accounts
    pub authority_id: String,
    pub name: String,
    pub default_keypair_id: Option<i64>,
}

/// Fields of an account to be created
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub authority_id: String,
    pub name: String,
}

/// A device model registered under an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
}

/// An account-scoped override binding a model for a store to another keypair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substore {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "accountID")]
    pub account_id: i64,
    pub store: String,
    #[serde(rename = "fromModel")]
    pub from_model: String,
    #[serde(rename = "modelname")]
    pub model_name: String,
    #[serde(rename = "keypairID")]
    pub keypair_id: i64,
}

/// A signing keypair
#[derive(Clone)]
pub struct Keypair {
    pub id: i64,
    pub authority_id: String,
    pub key_name: String,
    /// Fingerprint of the public key
    pub key_id: String,
    pub public_key: Vec<u8>,
    /// Ed25519 seed
    pub material: Vec<u8>,
    pub active: bool,
    pub registered: bool,
    pub created_at: DateTime<Utc>,
}

impl Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("id", &self.id)
            .field("authority_id", &self.authority_id)
            .field("key_name", &self.key_name)
            .field("key_id", &self.key_id)
            .field("active", &self.active)
            .field("registered", &self.registered)
            .field("material", &"[redacted]")
            .finish()
    }
}

impl Keypair {
    /// Rebuild the signing key from the stored seed
    pub fn signing_key(&self) -> vault_core::Result<KeyPair> {
        KeyPair::from_seed(&self.material)
    }
}

/// Fields of a keypair to be stored
#[derive(Clone)]
pub struct NewKeypair {
    pub authority_id: String,
    pub key_name: String,
    pub key_id: String,
    pub public_key: Vec<u8>,
    pub material: Vec<u8>,
}

impl NewKeypair {
    /// Describe a key pair for storage under an authority
    pub fn from_key_pair(authority_id: &str, key_name: &str, key_pair: &KeyPair) -> Self {
        Self {
            authority_id: authority_id.to_string(),
            key_name: key_name.to_string(),
            key_id: key_pair.key_id().to_string(),
            public_key: key_pair.verifying_key_bytes().to_vec(),
            material: key_pair.seed_bytes().to_vec(),
        }
    }
}

/// A single-use request identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Outcome of an atomic redemption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceRedemption {
    Redeemed,
    Unknown,
    Expired,
    AlreadyConsumed,
}

/// A user of the vault; source of principals for both credential types
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub accounts: BTreeSet<i64>,
}

impl Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("accounts", &self.accounts)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Record of a successful signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningLogEntry {
    pub id: i64,
    pub account_id: i64,
    pub kind: AssertionKind,
    pub model: String,
    pub serial: Option<String>,
    pub key_id: String,
    pub substore_id: Option<i64>,
    pub nonce: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a signing log entry to be appended
#[derive(Debug, Clone)]
pub struct NewSigningLogEntry {
    pub account_id: i64,
    pub kind: AssertionKind,
    pub model: String,
    pub serial: Option<String>,
    pub key_id: String,
    pub substore_id: Option<i64>,
    pub nonce: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage backend trait for vault state
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait Datastore: Send + Sync + Debug {
    // =========================================================================
    // Accounts and Models
    // =========================================================================

    /// Create an account; the authority ID must be unused
    async fn create_account(&self, account: NewAccount) -> Result<Account, StorageError>;

    async fn get_account(&self, id: i64) -> Result<Option<Account>, StorageError>;

    async fn get_account_by_authority(&self, authority_id: &str) -> Result<Option<Account>, StorageError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, StorageError>;

    /// Point the account at a default signing keypair
    async fn set_default_keypair(&self, account_id: i64, keypair_id: i64) -> Result<Account, StorageError>;

    /// Create a model; names are unique per account
    async fn create_model(&self, account_id: i64, name: &str) -> Result<Model, StorageError>;

    async fn get_model(&self, account_id: i64, name: &str) -> Result<Option<Model>, StorageError>;

    async fn list_models(&self, account_id: i64) -> Result<Vec<Model>, StorageError>;

    // =========================================================================
    // Keypairs
    // =========================================================================

    /// Store a keypair, disabled; (authority, name) must be unused
    async fn create_keypair(&self, keypair: NewKeypair) -> Result<Keypair, StorageError>;

    async fn get_keypair(&self, id: i64) -> Result<Option<Keypair>, StorageError>;

    async fn find_keypair(&self, authority_id: &str, key_name: &str) -> Result<Option<Keypair>, StorageError>;

    async fn list_keypairs(&self) -> Result<Vec<Keypair>, StorageError>;

    async fn set_keypair_active(&self, id: i64, active: bool) -> Result<Keypair, StorageError>;

    async fn mark_keypair_registered(&self, id: i64) -> Result<Keypair, StorageError>;

    /// Mark key generation in progress; false if it already was
    async fn mark_keypair_pending(&self, authority_id: &str, key_name: &str) -> Result<bool, StorageError>;

    async fn clear_keypair_pending(&self, authority_id: &str, key_name: &str) -> Result<(), StorageError>;

    async fn is_keypair_pending(&self, authority_id: &str, key_name: &str) -> Result<bool, StorageError>;

    // =========================================================================
    // Sub-stores
    // =========================================================================

    /// Sub-stores owned by the account, if the principal may act for it
    async fn list_substores(&self, account_id: i64, principal: &Principal) -> Result<Vec<Substore>, StorageError>;

    async fn get_substore(&self, id: i64) -> Result<Option<Substore>, StorageError>;

    async fn find_substore(
        &self,
        account_id: i64,
        store: &str,
        from_model: &str,
    ) -> Result<Option<Substore>, StorageError>;

    /// Create a sub-store; (account, store, from_model) must be unused
    async fn create_substore(&self, store: Substore, principal: &Principal) -> Result<Substore, StorageError>;

    /// Update a sub-store whose stored account matches and is the principal's
    async fn update_substore(&self, store: Substore, principal: &Principal) -> Result<Substore, StorageError>;

    /// Delete a sub-store the principal owns that no signing log entry references
    async fn delete_substore(&self, id: i64, principal: &Principal) -> Result<(), StorageError>;

    // =========================================================================
    // Nonces
    // =========================================================================

    async fn create_nonce(&self, nonce: Nonce) -> Result<(), StorageError>;

    /// Atomically consume an unexpired, unconsumed nonce
    async fn redeem_nonce(&self, token: &str, now: DateTime<Utc>) -> Result<NonceRedemption, StorageError>;

    /// Drop nonces that expired before `now`; returns how many
    async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;

    // =========================================================================
    // Users
    // =========================================================================

    async fn create_user(&self, user: User) -> Result<(), StorageError>;

    async fn get_user(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, StorageError>;

    // =========================================================================
    // Signing Log
    // =========================================================================

    async fn append_signing_log(&self, entry: NewSigningLogEntry) -> Result<SigningLogEntry, StorageError>;

    /// Entries of the accounts the principal may act for, newest first
    async fn list_signing_log(&self, principal: &Principal) -> Result<Vec<SigningLogEntry>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_subcodes() {
        assert_eq!(StorageError::NotFound("x".into()).subcode(), "error-store-not-found");
        assert_eq!(StorageError::InUse("x".into()).subcode(), "error-store-in-use");
        assert_eq!(StorageError::Forbidden("x".into()).subcode(), "error-auth");
        assert_eq!(StorageError::Database("x".into()).subcode(), "error-store-storage");
    }

    #[test]
    fn test_substore_json_field_names() {
        let store = Substore {
            id: 3,
            account_id: 7,
            store: "brand-x".into(),
            from_model: "m1".into(),
            model_name: "m1-pivot".into(),
            keypair_id: 2,
        };
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["accountID"], 7);
        assert_eq!(json["fromModel"], "m1");
        assert_eq!(json["modelname"], "m1-pivot");
        assert_eq!(json["keypairID"], 2);
    }

    #[test]
    fn test_keypair_debug_redacts_material() {
        let kp = KeyPair::generate();
        let row = Keypair {
            id: 1,
            authority_id: "acme".into(),
            key_name: "k".into(),
            key_id: kp.key_id().into(),
            public_key: kp.verifying_key_bytes().to_vec(),
            material: kp.seed_bytes().to_vec(),
            active: false,
            registered: false,
            created_at: Utc::now(),
        };
        assert!(format!("{:?}", row).contains("[redacted]"));
        assert_eq!(row.signing_key().unwrap().key_id(), kp.key_id());
    }
}
