//! Request-ID (nonce) issuance and redemption
//!
//! A nonce moves `Issued -> Consumed` on a successful redemption or
//! `Issued -> Expired` once its TTL elapses. Both are terminal. The
//! check-and-mark is a single datastore call, so two concurrent redemptions
//! of the same token can never both win.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use vault_core::Clock;

use crate::storage::{Datastore, Nonce, NonceRedemption, StorageError};

/// Default lifetime of an issued nonce
pub const DEFAULT_NONCE_TTL_SECS: i64 = 600;

/// Random bytes per token
const TOKEN_BYTES: usize = 32;

/// Errors from nonce issuance and redemption
#[derive(Error, Debug)]
pub enum NonceError {
    /// Unknown, expired or already consumed
    #[error("Invalid request-id: {0}")]
    Invalid(&'static str),

    /// The configured TTL pushes the expiry past the representable range
    #[error("Request-id lifetime {0} is out of range")]
    TtlOutOfRange(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Proof that a nonce was consumed
///
/// Not `Clone`: handing it to the signer moves it, so one redemption can back
/// at most one assertion.
#[derive(Debug, PartialEq, Eq)]
pub struct RedeemedNonce {
    token: String,
}

impl RedeemedNonce {
    /// The consumed token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Give up the proof, keeping the token
    pub fn into_token(self) -> String {
        self.token
    }
}

/// Issues and redeems single-use request identifiers
#[derive(Debug)]
pub struct NonceIssuer {
    store: Arc<dyn Datastore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl NonceIssuer {
    pub fn new(store: Arc<dyn Datastore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Lifetime of issued nonces
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh nonce, purging expired ones first
    pub async fn issue(&self) -> Result<Nonce, NonceError> {
        let now = self.clock.now();

        let purged = self.store.purge_expired_nonces(now).await?;
        if purged > 0 {
            debug!(purged, "Purged expired request-ids");
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(NonceError::TtlOutOfRange(self.ttl))?;

        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let nonce = Nonce {
            token: URL_SAFE_NO_PAD.encode(bytes),
            issued_at: now,
            expires_at,
            consumed: false,
        };
        self.store.create_nonce(nonce.clone()).await?;

        Ok(nonce)
    }

    /// Atomically consume a nonce
    pub async fn redeem(&self, token: &str) -> Result<RedeemedNonce, NonceError> {
        if token.is_empty() {
            return Err(NonceError::Invalid("missing"));
        }

        match self.store.redeem_nonce(token, self.clock.now()).await? {
            NonceRedemption::Redeemed => Ok(RedeemedNonce {
                token: token.to_string(),
            }),
            NonceRedemption::Unknown => {
                warn!("Redemption of unknown request-id");
                Err(NonceError::Invalid("unknown"))
            }
            NonceRedemption::Expired => {
                warn!("Redemption of expired request-id");
                Err(NonceError::Invalid("expired"))
            }
            NonceRedemption::AlreadyConsumed => {
                warn!("SECURITY: Replay of consumed request-id");
                Err(NonceError::Invalid("already used"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use vault_core::ManualClock;

    fn issuer() -> (NonceIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let issuer = NonceIssuer::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Duration::seconds(DEFAULT_NONCE_TTL_SECS),
        );
        (issuer, clock)
    }

    #[tokio::test]
    async fn test_issue_and_redeem_once() {
        let (issuer, _) = issuer();
        let nonce = issuer.issue().await.unwrap();

        // 32 bytes, unpadded base64url
        assert_eq!(nonce.token.len(), 43);
        assert_eq!(nonce.expires_at - nonce.issued_at, Duration::seconds(600));

        let redeemed = issuer.redeem(&nonce.token).await.unwrap();
        assert_eq!(redeemed.token(), nonce.token);

        assert!(matches!(
            issuer.redeem(&nonce.token).await,
            Err(NonceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_tokens_are_distinct() {
        let (issuer, _) = issuer();
        let a = issuer.issue().await.unwrap();
        let b = issuer.issue().await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn test_expired_nonce_rejected() {
        let (issuer, clock) = issuer();
        let nonce = issuer.issue().await.unwrap();

        clock.advance(Duration::seconds(DEFAULT_NONCE_TTL_SECS + 1));

        assert!(matches!(
            issuer.redeem(&nonce.token).await,
            Err(NonceError::Invalid("expired"))
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_rejected() {
        let (issuer, _) = issuer();
        assert!(matches!(issuer.redeem("nope").await, Err(NonceError::Invalid("unknown"))));
        assert!(matches!(issuer.redeem("").await, Err(NonceError::Invalid("missing"))));
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_an_error() {
        let issuer = NonceIssuer::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::starting_at(Utc::now())),
            Duration::days(100_000_000),
        );
        assert!(matches!(issuer.issue().await, Err(NonceError::TtlOutOfRange(_))));
    }
}
