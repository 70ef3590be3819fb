//! In-memory storage backend
//!
//! Default storage implementation using in-memory maps.
//! Suitable for development and single-instance deployments.
//! Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};
use vault_core::Principal;

use super::{
    Account, Datastore, Keypair, Model, NewAccount, NewKeypair, NewSigningLogEntry, Nonce,
    NonceRedemption, SigningLogEntry, StorageError, Substore, User,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read()
        .map_err(|_| StorageError::Database("lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write()
        .map_err(|_| StorageError::Database("lock poisoned".into()))
}

/// In-memory datastore implementation
///
/// Lock order when more than one table is held: substores, then signing log.
#[derive(Debug)]
pub struct MemoryStore {
    next_id: AtomicI64,
    accounts: RwLock<BTreeMap<i64, Account>>,
    models: RwLock<BTreeMap<i64, Model>>,
    keypairs: RwLock<BTreeMap<i64, Keypair>>,
    pending: RwLock<HashSet<(String, String)>>,
    substores: RwLock<BTreeMap<i64, Substore>>,
    nonces: RwLock<HashMap<String, Nonce>>,
    users: RwLock<HashMap<String, User>>,
    signing_log: RwLock<Vec<SigningLogEntry>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            accounts: RwLock::new(BTreeMap::new()),
            models: RwLock::new(BTreeMap::new()),
            keypairs: RwLock::new(BTreeMap::new()),
            pending: RwLock::new(HashSet::new()),
            substores: RwLock::new(BTreeMap::new()),
            nonces: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            signing_log: RwLock::new(Vec::new()),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn same_slot(a: &Substore, b: &Substore) -> bool {
    a.account_id == b.account_id && a.store == b.store && a.from_model == b.from_model
}

#[async_trait]
impl Datastore for MemoryStore {
    // =========================================================================
    // Accounts and Models
    // =========================================================================

    async fn create_account(&self, account: NewAccount) -> Result<Account, StorageError> {
        let mut accounts = write(&self.accounts)?;
        if accounts.values().any(|a| a.authority_id == account.authority_id) {
            return Err(StorageError::AlreadyExists(account.authority_id));
        }

        let account = Account {
            id: self.next_id(),
            authority_id: account.authority_id,
            name: account.name,
            default_keypair_id: None,
        };
        info!(account_id = account.id, authority = %account.authority_id, "Created account");
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>, StorageError> {
        Ok(read(&self.accounts)?.get(&id).cloned())
    }

    async fn get_account_by_authority(&self, authority_id: &str) -> Result<Option<Account>, StorageError> {
        let accounts = read(&self.accounts)?;
        Ok(accounts.values().find(|a| a.authority_id == authority_id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        Ok(read(&self.accounts)?.values().cloned().collect())
    }

    async fn set_default_keypair(&self, account_id: i64, keypair_id: i64) -> Result<Account, StorageError> {
        let mut accounts = write(&self.accounts)?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", account_id)))?;
        account.default_keypair_id = Some(keypair_id);
        info!(account_id, keypair_id, "Set default keypair");
        Ok(account.clone())
    }

    async fn create_model(&self, account_id: i64, name: &str) -> Result<Model, StorageError> {
        let mut models = write(&self.models)?;
        if models.values().any(|m| m.account_id == account_id && m.name == name) {
            return Err(StorageError::AlreadyExists(format!("model {}", name)));
        }

        let model = Model {
            id: self.next_id(),
            account_id,
            name: name.to_string(),
        };
        models.insert(model.id, model.clone());
        Ok(model)
    }

    async fn get_model(&self, account_id: i64, name: &str) -> Result<Option<Model>, StorageError> {
        let models = read(&self.models)?;
        Ok(models
            .values()
            .find(|m| m.account_id == account_id && m.name == name)
            .cloned())
    }

    async fn list_models(&self, account_id: i64) -> Result<Vec<Model>, StorageError> {
        let models = read(&self.models)?;
        Ok(models.values().filter(|m| m.account_id == account_id).cloned().collect())
    }

    // =========================================================================
    // Keypairs
    // =========================================================================

    async fn create_keypair(&self, keypair: NewKeypair) -> Result<Keypair, StorageError> {
        let mut keypairs = write(&self.keypairs)?;
        if keypairs
            .values()
            .any(|k| k.authority_id == keypair.authority_id && k.key_name == keypair.key_name)
        {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                keypair.authority_id, keypair.key_name
            )));
        }

        let row = Keypair {
            id: self.next_id(),
            authority_id: keypair.authority_id,
            key_name: keypair.key_name,
            key_id: keypair.key_id,
            public_key: keypair.public_key,
            material: keypair.material,
            active: false,
            registered: false,
            created_at: Utc::now(),
        };
        info!(id = row.id, key_id = %row.key_id, authority = %row.authority_id, "Stored keypair");
        keypairs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_keypair(&self, id: i64) -> Result<Option<Keypair>, StorageError> {
        Ok(read(&self.keypairs)?.get(&id).cloned())
    }

    async fn find_keypair(&self, authority_id: &str, key_name: &str) -> Result<Option<Keypair>, StorageError> {
        let keypairs = read(&self.keypairs)?;
        Ok(keypairs
            .values()
            .find(|k| k.authority_id == authority_id && k.key_name == key_name)
            .cloned())
    }

    async fn list_keypairs(&self) -> Result<Vec<Keypair>, StorageError> {
        Ok(read(&self.keypairs)?.values().cloned().collect())
    }

    async fn set_keypair_active(&self, id: i64, active: bool) -> Result<Keypair, StorageError> {
        let mut keypairs = write(&self.keypairs)?;
        let row = keypairs
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("keypair {}", id)))?;
        row.active = active;
        Ok(row.clone())
    }

    async fn mark_keypair_registered(&self, id: i64) -> Result<Keypair, StorageError> {
        let mut keypairs = write(&self.keypairs)?;
        let row = keypairs
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("keypair {}", id)))?;
        row.registered = true;
        Ok(row.clone())
    }

    async fn mark_keypair_pending(&self, authority_id: &str, key_name: &str) -> Result<bool, StorageError> {
        let mut pending = write(&self.pending)?;
        Ok(pending.insert((authority_id.to_string(), key_name.to_string())))
    }

    async fn clear_keypair_pending(&self, authority_id: &str, key_name: &str) -> Result<(), StorageError> {
        let mut pending = write(&self.pending)?;
        pending.remove(&(authority_id.to_string(), key_name.to_string()));
        Ok(())
    }

    async fn is_keypair_pending(&self, authority_id: &str, key_name: &str) -> Result<bool, StorageError> {
        let pending = read(&self.pending)?;
        Ok(pending.contains(&(authority_id.to_string(), key_name.to_string())))
    }

    // =========================================================================
    // Sub-stores
    // =========================================================================

    async fn list_substores(&self, account_id: i64, principal: &Principal) -> Result<Vec<Substore>, StorageError> {
        if !principal.can_act_for(account_id) {
            return Ok(Vec::new());
        }
        let substores = read(&self.substores)?;
        Ok(substores
            .values()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn get_substore(&self, id: i64) -> Result<Option<Substore>, StorageError> {
        Ok(read(&self.substores)?.get(&id).cloned())
    }

    async fn find_substore(
        &self,
        account_id: i64,
        store: &str,
        from_model: &str,
    ) -> Result<Option<Substore>, StorageError> {
        let substores = read(&self.substores)?;
        Ok(substores
            .values()
            .find(|s| s.account_id == account_id && s.store == store && s.from_model == from_model)
            .cloned())
    }

    async fn create_substore(&self, store: Substore, principal: &Principal) -> Result<Substore, StorageError> {
        if !principal.can_act_for(store.account_id) {
            return Err(StorageError::Forbidden(format!("account {}", store.account_id)));
        }

        let mut substores = write(&self.substores)?;
        if substores.values().any(|s| same_slot(s, &store)) {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                store.store, store.from_model
            )));
        }

        let store = Substore {
            id: self.next_id(),
            ..store
        };
        info!(id = store.id, account_id = store.account_id, store = %store.store, "Created sub-store");
        substores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn update_substore(&self, store: Substore, principal: &Principal) -> Result<Substore, StorageError> {
        let mut substores = write(&self.substores)?;

        let existing = substores
            .get(&store.id)
            .ok_or_else(|| StorageError::NotFound(format!("sub-store {}", store.id)))?;
        if existing.account_id != store.account_id || !principal.can_act_for(existing.account_id) {
            warn!(
                id = store.id,
                owner = existing.account_id,
                claimed = store.account_id,
                principal = %principal.identity,
                "Sub-store update rejected: ownership mismatch"
            );
            return Err(StorageError::Forbidden(format!("sub-store {}", store.id)));
        }
        if substores
            .values()
            .any(|s| s.id != store.id && same_slot(s, &store))
        {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                store.store, store.from_model
            )));
        }

        info!(id = store.id, account_id = store.account_id, "Updated sub-store");
        substores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn delete_substore(&self, id: i64, principal: &Principal) -> Result<(), StorageError> {
        let mut substores = write(&self.substores)?;

        let existing = substores
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(format!("sub-store {}", id)))?;
        if !principal.can_act_for(existing.account_id) {
            warn!(id, owner = existing.account_id, principal = %principal.identity, "Sub-store delete rejected: not owner");
            return Err(StorageError::Forbidden(format!("sub-store {}", id)));
        }
        if read(&self.signing_log)?.iter().any(|e| e.substore_id == Some(id)) {
            return Err(StorageError::InUse(format!("sub-store {}", id)));
        }

        substores.remove(&id);
        info!(id, "Deleted sub-store");
        Ok(())
    }

    // =========================================================================
    // Nonces
    // =========================================================================

    async fn create_nonce(&self, nonce: Nonce) -> Result<(), StorageError> {
        let mut nonces = write(&self.nonces)?;
        if nonces.contains_key(&nonce.token) {
            return Err(StorageError::AlreadyExists("nonce".into()));
        }
        nonces.insert(nonce.token.clone(), nonce);
        Ok(())
    }

    async fn redeem_nonce(&self, token: &str, now: DateTime<Utc>) -> Result<NonceRedemption, StorageError> {
        let mut nonces = write(&self.nonces)?;
        let Some(nonce) = nonces.get_mut(token) else {
            return Ok(NonceRedemption::Unknown);
        };

        if nonce.consumed {
            return Ok(NonceRedemption::AlreadyConsumed);
        }
        if nonce.expires_at <= now {
            return Ok(NonceRedemption::Expired);
        }

        nonce.consumed = true;
        Ok(NonceRedemption::Redeemed)
    }

    async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut nonces = write(&self.nonces)?;
        let before = nonces.len();
        nonces.retain(|_, n| n.expires_at > now);
        Ok((before - nonces.len()) as u64)
    }

    // =========================================================================
    // Users
    // =========================================================================

    async fn create_user(&self, user: User) -> Result<(), StorageError> {
        let mut users = write(&self.users)?;
        if users.contains_key(&user.username) {
            return Err(StorageError::AlreadyExists(user.username));
        }
        if let Some(key) = &user.api_key {
            if users.values().any(|u| u.api_key.as_ref() == Some(key)) {
                return Err(StorageError::AlreadyExists("api key".into()));
            }
        }
        info!(username = %user.username, role = %user.role, "Created user");
        users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(read(&self.users)?.get(username).cloned())
    }

    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, StorageError> {
        let users = read(&self.users)?;
        Ok(users
            .values()
            .find(|u| u.api_key.as_deref() == Some(api_key))
            .cloned())
    }

    // =========================================================================
    // Signing Log
    // =========================================================================

    async fn append_signing_log(&self, entry: NewSigningLogEntry) -> Result<SigningLogEntry, StorageError> {
        let mut log = write(&self.signing_log)?;
        let entry = SigningLogEntry {
            id: self.next_id(),
            account_id: entry.account_id,
            kind: entry.kind,
            model: entry.model,
            serial: entry.serial,
            key_id: entry.key_id,
            substore_id: entry.substore_id,
            nonce: entry.nonce,
            created_at: entry.created_at,
        };
        log.push(entry.clone());
        Ok(entry)
    }

    async fn list_signing_log(&self, principal: &Principal) -> Result<Vec<SigningLogEntry>, StorageError> {
        let log = read(&self.signing_log)?;
        Ok(log
            .iter()
            .rev()
            .filter(|e| principal.can_act_for(e.account_id))
            .cloned()
            .collect())
    }
}
