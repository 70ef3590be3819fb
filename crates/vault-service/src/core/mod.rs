//! Core logic for the serial vault
//!
//! Components here take an explicit [`RequestContext`] and never read
//! credentials themselves; authentication happens in the API layer.

pub mod nonce;
pub mod permissions;
pub mod resolver;
pub mod signer;

pub use nonce::{NonceError, NonceIssuer, RedeemedNonce, DEFAULT_NONCE_TTL_SECS};
pub use permissions::{authorize, authorize_role, DenialReason, PermissionDenied};
pub use resolver::{Resolution, SigningPolicy, SubstoreError, SubstoreResolver};
pub use signer::{AssertionSigner, SignError, SignedOutput};

use vault_core::Principal;

/// Who is making the request, and how
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    /// Authenticated by API key rather than a user session
    pub api_call: bool,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            api_call: false,
        }
    }

    /// Context for a request authenticated by API key
    pub fn api(principal: Principal) -> Self {
        Self {
            principal,
            api_call: true,
        }
    }
}
