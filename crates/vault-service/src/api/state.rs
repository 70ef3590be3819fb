//! Application state shared by every handler

use std::sync::Arc;
use vault_auth::handlers::{ApiKeyHandler, SessionHandler};
use vault_auth::Authenticator;
use vault_core::Clock;

use crate::auth::DatastoreCredentials;
use crate::config::VaultConfig;
use crate::core::{AssertionSigner, NonceIssuer, SubstoreResolver};
use crate::keys::{KeypairStore, StoreRegistrar};
use crate::storage::Datastore;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub keypairs: KeypairStore,
    pub nonces: NonceIssuer,
    pub resolver: SubstoreResolver,
    pub signer: AssertionSigner,
    pub authenticator: Authenticator,
    /// Also registered with `authenticator`; kept here to issue tokens
    pub sessions: Arc<SessionHandler>,
    pub clock: Arc<dyn Clock>,
    pub config: VaultConfig,
}

impl AppState {
    /// Wire the components over one datastore
    pub fn new(
        store: Arc<dyn Datastore>,
        registrar: Arc<dyn StoreRegistrar>,
        clock: Arc<dyn Clock>,
        config: VaultConfig,
    ) -> Self {
        let credentials = DatastoreCredentials::new(store.clone());
        let sessions = Arc::new(SessionHandler::new(
            &config.session_secret,
            config.session_ttl,
            credentials.clone(),
        ));

        let authenticator = Authenticator::builder()
            .with_handler(ApiKeyHandler::new(credentials))
            .with_handler(sessions.clone())
            .build();

        Self {
            keypairs: KeypairStore::new(store.clone(), registrar),
            nonces: NonceIssuer::new(store.clone(), clock.clone(), config.nonce_ttl),
            resolver: SubstoreResolver::new(store.clone()),
            signer: AssertionSigner::new(clock.clone()),
            authenticator,
            sessions,
            store,
            clock,
            config,
        }
    }
}
