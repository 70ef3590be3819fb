//! Shared harness for the HTTP-level tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower::ServiceExt;
use vault_core::{KeyPair, ManualClock, Role};

use vault_service::keys::{RegistrarError, RegistrationResult, StoreCredentials, StoreRegistrar};
use vault_service::storage::{Account, Keypair, NewAccount, NewKeypair, User};
use vault_service::{create_router, AppState, Datastore, MemoryStore, VaultConfig};

/// Registrar that accepts every key without a network call
#[derive(Debug)]
pub struct AcceptingRegistrar;

#[async_trait]
impl StoreRegistrar for AcceptingRegistrar {
    async fn register(
        &self,
        keypair: &Keypair,
        _credentials: &StoreCredentials,
    ) -> Result<RegistrationResult, RegistrarError> {
        Ok(RegistrationResult {
            key_id: keypair.key_id.clone(),
            account_key_assertion: None,
        })
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

/// A brand account with an enabled default keypair and model `m1`
pub struct Brand {
    pub account: Account,
    pub default_key: Keypair,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let state = Arc::new(AppState::new(
            store.clone(),
            Arc::new(AcceptingRegistrar),
            clock.clone(),
            VaultConfig::default(),
        ));

        Self {
            app: create_router(state.clone()),
            state,
            store,
            clock,
        }
    }

    pub async fn brand(&self, authority: &str) -> Brand {
        let account = self
            .store
            .create_account(NewAccount {
                authority_id: authority.into(),
                name: authority.to_uppercase(),
            })
            .await
            .unwrap();

        let key = self
            .store
            .create_keypair(NewKeypair::from_key_pair(authority, "default", &KeyPair::generate()))
            .await
            .unwrap();
        let default_key = self.store.set_keypair_active(key.id, true).await.unwrap();
        let account = self.store.set_default_keypair(account.id, default_key.id).await.unwrap();
        self.store.create_model(account.id, "m1").await.unwrap();

        Brand { account, default_key }
    }

    /// Enabled, registered keypair for sub-store use
    pub async fn store_key(&self, authority: &str, name: &str) -> Keypair {
        let key = self
            .store
            .create_keypair(NewKeypair::from_key_pair(authority, name, &KeyPair::generate()))
            .await
            .unwrap();
        self.store.set_keypair_active(key.id, true).await.unwrap();
        self.store.mark_keypair_registered(key.id).await.unwrap()
    }

    /// Create a user and return its API key
    pub async fn user(&self, username: &str, role: Role, accounts: &[i64]) -> String {
        let api_key = format!("{}-key", username);
        self.store
            .create_user(User {
                username: username.into(),
                name: username.into(),
                email: format!("{}@example.com", username),
                role,
                api_key: Some(api_key.clone()),
                accounts: accounts.iter().copied().collect::<BTreeSet<_>>(),
            })
            .await
            .unwrap();
        api_key
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn call(&self, method: Method, uri: &str, api_key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("api-key", key);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, api_key: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(api_key), None).await
    }

    pub async fn post(&self, uri: &str, api_key: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(api_key), Some(body)).await
    }

    pub async fn put(&self, uri: &str, api_key: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(api_key), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, api_key: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(api_key), None).await
    }

    pub async fn request_id(&self, api_key: &str) -> String {
        let (status, body) = self.call(Method::POST, "/v1/request-id", Some(api_key), None).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["request-id"].as_str().unwrap().to_string()
    }
}

pub fn substore_body(id: i64, account_id: i64, keypair_id: i64) -> Value {
    json!({
        "id": id,
        "accountID": account_id,
        "store": "brand-x",
        "fromModel": "m1",
        "modelname": "m1-pivot",
        "keypairID": keypair_id,
    })
}

pub fn serial_body(brand: &str, serial: &str, request_id: &str) -> Value {
    json!({
        "brand-id": brand,
        "model": "m1",
        "serial": serial,
        "device-key": "AAAAdevicekey",
        "request-id": request_id,
    })
}

pub fn assert_error(status: StatusCode, body: &Value, expected_status: StatusCode, code: &str) {
    assert_eq!(status, expected_status, "{}", body);
    assert_eq!(body["success"], false, "{}", body);
    assert_eq!(body["error_code"], code, "{}", body);
}
