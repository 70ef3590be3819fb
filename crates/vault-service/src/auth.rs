//! Credential backends over the vault datastore
//!
//! Both credential types resolve to the same `User` rows, so role and account
//! changes apply to API keys and sessions alike on the next request.

use async_trait::async_trait;
use std::sync::Arc;
use vault_auth::handlers::{ApiKeyBackend, ApiKeyInfo, UserDirectory};
use vault_auth::AuthError;
use vault_core::Principal;

use crate::storage::{Datastore, StorageError, User};

/// Looks up API keys and session users in the datastore
#[derive(Debug, Clone)]
pub struct DatastoreCredentials {
    store: Arc<dyn Datastore>,
}

impl DatastoreCredentials {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }
}

fn backend_error(err: StorageError) -> AuthError {
    AuthError::Backend(err.to_string())
}

fn principal_of(user: User) -> Principal {
    Principal::user(user.username, user.role).with_accounts(user.accounts)
}

#[async_trait]
impl ApiKeyBackend for DatastoreCredentials {
    async fn lookup(&self, api_key: &str) -> vault_auth::Result<ApiKeyInfo> {
        let user = self
            .store
            .find_user_by_api_key(api_key)
            .await
            .map_err(backend_error)?
            .ok_or(AuthError::ApiKeyNotFound)?;

        Ok(ApiKeyInfo::new(user.username.clone(), user.username, user.role).with_accounts(user.accounts))
    }

    fn description(&self) -> &str {
        "datastore users"
    }
}

#[async_trait]
impl UserDirectory for DatastoreCredentials {
    async fn find_user(&self, username: &str) -> vault_auth::Result<Option<Principal>> {
        Ok(self
            .store
            .get_user(username)
            .await
            .map_err(backend_error)?
            .map(principal_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::BTreeSet;
    use vault_core::Role;

    async fn credentials() -> DatastoreCredentials {
        let store = Arc::new(MemoryStore::new());
        store
            .create_user(User {
                username: "alice".into(),
                name: "Alice".into(),
                email: "alice@example.com".into(),
                role: Role::Admin,
                api_key: Some("alice-key".into()),
                accounts: BTreeSet::from([7]),
            })
            .await
            .unwrap();
        DatastoreCredentials::new(store)
    }

    #[tokio::test]
    async fn test_api_key_lookup() {
        let creds = credentials().await;
        let info = creds.lookup("alice-key").await.unwrap();
        assert_eq!(info.owner, "alice");
        assert_eq!(info.role, Role::Admin);
        assert!(info.accounts.contains(&7));

        assert!(matches!(creds.lookup("nope").await, Err(AuthError::ApiKeyNotFound)));
    }

    #[tokio::test]
    async fn test_user_directory() {
        let creds = credentials().await;
        let principal = creds.find_user("alice").await.unwrap().unwrap();
        assert!(principal.is_member_of(7));
        assert!(creds.find_user("bob").await.unwrap().is_none());
    }
}
