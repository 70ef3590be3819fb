//! # Vault Core
//!
//! Domain types and cryptographic primitives for the serial vault, the
//! service that signs device-identity assertions on behalf of brand accounts.
//!
//! ## Key Concepts
//!
//! - **Principal**: the authenticated caller, with a role tier and the set of
//!   accounts it may act for
//! - **Action**: an operation gated by the permission evaluator, with a
//!   minimum role
//! - **Assertion**: a typed header set (serial, model, system-user) signed by
//!   an authority's key
//! - **KeyPair**: an Ed25519 signing key, identified by the fingerprint of its
//!   public half

pub mod assertion;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod types;

pub use assertion::{Assertion, AssertionBuilder, AssertionKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{key_fingerprint, KeyPair, PublicKey, SignedAssertion};
pub use error::{CoreError, Result};
pub use types::{Action, Principal, PrincipalKind, Role};

