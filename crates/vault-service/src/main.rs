//! Serial Vault Server Binary
//!
//! Runs the serial vault HTTP server.

use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use vault_core::{Role, SystemClock};

use vault_service::storage::{StorageError, User};
use vault_service::{create_router, AppState, Datastore, HttpStoreRegistrar, MemoryStore, VaultConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match VaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("serial-vault: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("serial-vault: failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Serial vault stopped");
            ExitCode::FAILURE
        }
    }
}

async fn open_store(config: &VaultConfig) -> Result<Arc<dyn Datastore>, StorageError> {
    #[cfg(feature = "postgres")]
    if let Some(url) = &config.database_url {
        let store = vault_service::storage::PostgresStore::new(url).await?;
        return Ok(Arc::new(store));
    }

    if config.database_url.is_some() {
        tracing::warn!("SERIAL_VAULT_DATABASE_URL is set but the postgres feature is not enabled; using memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}

/// Create the bootstrap Superuser unless it already exists
async fn bootstrap_admin(store: &dyn Datastore, config: &VaultConfig) -> Result<(), StorageError> {
    let Some(admin) = &config.admin else {
        return Ok(());
    };
    if store.get_user(&admin.username).await?.is_some() {
        return Ok(());
    }

    store
        .create_user(User {
            username: admin.username.clone(),
            name: admin.username.clone(),
            email: String::new(),
            role: Role::Superuser,
            api_key: Some(admin.api_key.clone()),
            accounts: BTreeSet::new(),
        })
        .await?;
    info!(username = %admin.username, "Bootstrap superuser created");
    Ok(())
}

async fn run(config: VaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config).await?;
    bootstrap_admin(store.as_ref(), &config).await?;

    let registrar = Arc::new(HttpStoreRegistrar::new(config.store_url.clone()));
    let port = config.port;

    info!(
        instance = %config.instance,
        port,
        store_url = %config.store_url,
        nonce_ttl_secs = config.nonce_ttl.num_seconds(),
        "Starting serial vault"
    );

    // Create application state
    let state = Arc::new(AppState::new(store, registrar, Arc::new(SystemClock), config));

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Serial vault listening");

    axum::serve(listener, app).await?;
    Ok(())
}
