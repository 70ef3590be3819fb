//! Registration of account keys with the external store

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::Keypair;

/// Outbound request timeout
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the account-key endpoint on the store
const ACCOUNT_KEY_PATH: &str = "/dev/api/account/account-key";

/// Failure talking to the store
#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("Failed to reach the store: {0}")]
    Transport(String),

    #[error("The store rejected the key: {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Store credentials supplied by the caller for one registration
#[derive(Clone, Deserialize)]
pub struct StoreCredentials {
    pub macaroon: String,
    #[serde(default)]
    pub discharge: Option<String>,
}

impl Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("macaroon", &"[redacted]")
            .field("discharge", &self.discharge.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Outcome of a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationResult {
    pub key_id: String,
    /// Account-key assertion returned by the store, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_key_assertion: Option<String>,
}

/// Registers public keys with the external store
#[async_trait]
pub trait StoreRegistrar: Send + Sync + Debug {
    async fn register(
        &self,
        keypair: &Keypair,
        credentials: &StoreCredentials,
    ) -> Result<RegistrationResult, RegistrarError>;
}

#[derive(Serialize)]
struct AccountKeyRequest<'a> {
    #[serde(rename = "public-key")]
    public_key: String,
    #[serde(rename = "key-id")]
    key_id: &'a str,
    #[serde(rename = "authority-id")]
    authority_id: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct AccountKeyResponse {
    #[serde(default)]
    account_key_signed: Option<String>,
}

/// Registrar that POSTs the public key to the store over HTTPS
#[derive(Debug, Clone)]
pub struct HttpStoreRegistrar {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStoreRegistrar {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorization(credentials: &StoreCredentials) -> String {
        match &credentials.discharge {
            Some(discharge) => format!(
                "Macaroon root=\"{}\", discharge=\"{}\"",
                credentials.macaroon, discharge
            ),
            None => format!("Macaroon root=\"{}\"", credentials.macaroon),
        }
    }
}

#[async_trait]
impl StoreRegistrar for HttpStoreRegistrar {
    async fn register(
        &self,
        keypair: &Keypair,
        credentials: &StoreCredentials,
    ) -> Result<RegistrationResult, RegistrarError> {
        let url = format!("{}{}", self.base_url, ACCOUNT_KEY_PATH);
        let body = AccountKeyRequest {
            public_key: STANDARD.encode(&keypair.public_key),
            key_id: &keypair.key_id,
            authority_id: &keypair.authority_id,
            name: &keypair.key_name,
        };

        let response = self
            .client
            .post(&url)
            .timeout(REGISTRATION_TIMEOUT)
            .header(reqwest::header::AUTHORIZATION, Self::authorization(credentials))
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistrarError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(key_id = %keypair.key_id, status = status.as_u16(), "Store rejected account key");
            return Err(RegistrarError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The store may answer with an empty body
        let signed = response
            .json::<AccountKeyResponse>()
            .await
            .ok()
            .and_then(|r| r.account_key_signed);

        info!(key_id = %keypair.key_id, authority = %keypair.authority_id, "Account key registered with store");

        Ok(RegistrationResult {
            key_id: keypair.key_id.clone(),
            account_key_assertion: signed,
        })
    }
}
