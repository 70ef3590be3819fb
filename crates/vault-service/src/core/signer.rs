//! Assertion signer
//!
//! Builds the header set for an assertion kind, stamps the signing metadata
//! and signs it with the resolved keypair. Signing runs on the blocking pool.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use vault_core::assertion::headers;
use vault_core::{Assertion, AssertionKind, Clock, CoreError, SignedAssertion};

use super::nonce::RedeemedNonce;
use crate::storage::Keypair;

/// Revision stamped when the caller does not give one
const DEFAULT_REVISION: &str = "0";

/// Series stamped on model assertions when the caller does not give one
const DEFAULT_SERIES: &str = "16";

/// Errors from signing
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Keypair '{0}' is disabled")]
    KeyDisabled(String),

    #[error("A request-id is required for {0} assertions")]
    NonceRequired(AssertionKind),

    #[error("Invalid assertion: {0}")]
    InvalidAssertion(#[from] CoreError),

    #[error("Signing failed: {0}")]
    Crypto(String),

    #[error("Signing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A signed assertion along with what was consumed to produce it
#[derive(Debug, Clone)]
pub struct SignedOutput {
    pub assertion: Assertion,
    pub signed: SignedAssertion,
    pub key_id: String,
    /// Token of the nonce the assertion embeds
    pub nonce: Option<String>,
}

/// Signs assertions with stored keypairs
#[derive(Debug)]
pub struct AssertionSigner {
    clock: Arc<dyn Clock>,
}

impl AssertionSigner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sign an assertion of `kind` built from `payload`
    ///
    /// The keypair row is checked here, after resolution, so a key disabled
    /// between resolution and signing is still refused. The nonce is moved in
    /// and cannot back a second assertion.
    pub async fn sign(
        &self,
        kind: AssertionKind,
        mut payload: BTreeMap<String, Value>,
        keypair: &Keypair,
        nonce: Option<RedeemedNonce>,
    ) -> Result<SignedOutput, SignError> {
        if !keypair.active {
            warn!(
                key_id = %keypair.key_id,
                authority = %keypair.authority_id,
                "Sign request with disabled keypair"
            );
            return Err(SignError::KeyDisabled(keypair.key_name.clone()));
        }
        if kind.requires_nonce() && nonce.is_none() {
            return Err(SignError::NonceRequired(kind));
        }

        let nonce = nonce.map(RedeemedNonce::into_token);

        if matches!(kind, AssertionKind::Serial | AssertionKind::Model) {
            payload
                .entry(headers::REVISION.to_string())
                .or_insert_with(|| Value::from(DEFAULT_REVISION));
        }
        if kind == AssertionKind::Model {
            payload
                .entry(headers::SERIES.to_string())
                .or_insert_with(|| Value::from(DEFAULT_SERIES));
        }

        // Signing metadata always overrides caller-supplied headers
        let assertion = Assertion::builder(kind)
            .extra_headers(payload)
            .header(headers::AUTHORITY_ID, keypair.authority_id.as_str())
            .header(headers::SIGN_KEY_ID, keypair.key_id.as_str())
            .header(headers::TIMESTAMP, self.clock.now().to_rfc3339())
            .optional_header(headers::REQUEST_ID, nonce.clone())
            .build()?;

        let key = keypair.signing_key()?;
        let to_sign = assertion.clone();
        let signed = tokio::task::spawn_blocking(move || key.sign_assertion(&to_sign))
            .await?
            .map_err(|e| SignError::Crypto(e.to_string()))?;

        debug!(kind = %kind, key_id = %keypair.key_id, "Assertion signed");

        Ok(SignedOutput {
            assertion,
            signed,
            key_id: keypair.key_id.clone(),
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nonce::NonceIssuer;
    use crate::storage::{Datastore, MemoryStore, NewKeypair};
    use chrono::Duration;
    use serde_json::json;
    use vault_core::{KeyPair, ManualClock};

    async fn keypair(store: &MemoryStore, active: bool) -> Keypair {
        let kp = store
            .create_keypair(NewKeypair::from_key_pair("acme", "default", &KeyPair::generate()))
            .await
            .unwrap();
        if active {
            store.set_keypair_active(kp.id, true).await.unwrap()
        } else {
            kp
        }
    }

    fn model_payload() -> BTreeMap<String, Value> {
        let mut payload = BTreeMap::new();
        payload.insert("brand-id".into(), json!("acme"));
        payload.insert("model".into(), json!("rpi3"));
        payload.insert("gadget".into(), json!("pi3"));
        payload
    }

    #[tokio::test]
    async fn test_sign_model_verifies() {
        let store = MemoryStore::new();
        let kp = keypair(&store, true).await;
        let signer = AssertionSigner::new(Arc::new(ManualClock::default()));

        let out = signer
            .sign(AssertionKind::Model, model_payload(), &kp, None)
            .await
            .unwrap();

        let public = vault_core::PublicKey::from_bytes(&kp.public_key).unwrap();
        let verified = public.verify_assertion(&out.signed).unwrap();
        assert_eq!(verified.header_str("authority-id"), Some("acme"));
        assert_eq!(verified.header_str("sign-key-id"), Some(kp.key_id.as_str()));
        assert_eq!(verified.header_str("gadget"), Some("pi3"));
        assert_eq!(verified.header_str("series"), Some("16"));
        assert!(verified.header_str("timestamp").is_some());
        assert_eq!(out.key_id, kp.key_id);
    }

    #[tokio::test]
    async fn test_disabled_key_rejected() {
        let store = MemoryStore::new();
        let kp = keypair(&store, false).await;
        let signer = AssertionSigner::new(Arc::new(ManualClock::default()));

        let err = signer
            .sign(AssertionKind::Model, model_payload(), &kp, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::KeyDisabled(_)));
    }

    #[tokio::test]
    async fn test_serial_requires_nonce() {
        let store = MemoryStore::new();
        let kp = keypair(&store, true).await;
        let signer = AssertionSigner::new(Arc::new(ManualClock::default()));

        let mut payload = model_payload();
        payload.insert("serial".into(), json!("A1"));
        payload.insert("device-key".into(), json!("AAAA"));

        let err = signer
            .sign(AssertionKind::Serial, payload, &kp, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::NonceRequired(AssertionKind::Serial)));
    }

    #[tokio::test]
    async fn test_serial_embeds_request_id() {
        let store = Arc::new(MemoryStore::new());
        let kp = keypair(&store, true).await;
        let clock = Arc::new(ManualClock::default());
        let issuer = NonceIssuer::new(store.clone(), clock.clone(), Duration::seconds(600));
        let signer = AssertionSigner::new(clock);

        let nonce = issuer.issue().await.unwrap();
        let redeemed = issuer.redeem(&nonce.token).await.unwrap();

        let mut payload = model_payload();
        payload.insert("serial".into(), json!("A1"));
        payload.insert("device-key".into(), json!("AAAA"));

        let out = signer
            .sign(AssertionKind::Serial, payload, &kp, Some(redeemed))
            .await
            .unwrap();
        assert_eq!(out.assertion.header_str("request-id"), Some(nonce.token.as_str()));
        assert_eq!(out.nonce.as_deref(), Some(nonce.token.as_str()));
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let store = MemoryStore::new();
        let kp = keypair(&store, true).await;
        let signer = AssertionSigner::new(Arc::new(ManualClock::default()));

        let mut payload = model_payload();
        payload.remove("model");
        let err = signer
            .sign(AssertionKind::Model, payload, &kp, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::InvalidAssertion(CoreError::MissingHeader(_))));
    }
}
