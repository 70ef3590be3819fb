//! Cryptographic primitives for assertion signing
//!
//! Assertions are signed as COSE_Sign1 structures with Ed25519 keys. The
//! protected header carries the algorithm and the key ID of the signing key,
//! so any holder of the authority's public key can verify an assertion
//! without further context.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair for signing
//! - `PublicKey`: Ed25519 public key for verification
//! - `SignedAssertion`: COSE_Sign1 wrapped assertion

use crate::assertion::Assertion;
use crate::error::{CoreError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use coset::{iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha384};

/// COSE algorithm identifier for EdDSA (Ed25519)
const EDDSA_ALG: iana::Algorithm = iana::Algorithm::EdDSA;

/// Compute the key ID of a public key: base64url (unpadded) SHA-384 digest
pub fn key_fingerprint(public_key: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(Sha384::digest(public_key))
}

/// A signed assertion (COSE_Sign1 wrapped)
#[derive(Debug, Clone)]
pub struct SignedAssertion {
    cose: CoseSign1,
}

impl SignedAssertion {
    /// Get the raw COSE_Sign1 structure
    pub fn cose(&self) -> &CoseSign1 {
        &self.cose
    }

    /// Get the key ID from the protected header
    pub fn key_id(&self) -> Option<String> {
        let kid = &self.cose.protected.header.key_id;
        if kid.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(kid).to_string())
        }
    }

    /// Get the signature bytes
    pub fn signature(&self) -> &[u8] {
        &self.cose.signature
    }

    /// Serialize to CBOR bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.cose.clone().to_vec().map_err(CoreError::from)
    }

    /// Deserialize from CBOR bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cose = CoseSign1::from_slice(bytes).map_err(CoreError::from)?;
        Ok(Self { cose })
    }

    /// Base64 (standard alphabet) of the CBOR encoding
    pub fn to_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    /// Decode from base64 CBOR
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::SerializationError(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Extract and deserialize the assertion from the payload
    ///
    /// Note: This does NOT verify the signature. Use `PublicKey::verify_assertion` for that.
    pub fn extract_assertion(&self) -> Result<Assertion> {
        let payload = self
            .cose
            .payload
            .as_ref()
            .ok_or(CoreError::MissingHeader("payload".into()))?;
        Assertion::from_bytes(payload)
    }
}

/// Ed25519 key pair for signing assertions
#[derive(Clone)]
pub struct KeyPair {
    /// Fingerprint of the public key
    key_id: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            key_id: key_fingerprint(&verifying_key.to_bytes()),
            signing_key,
            verifying_key,
        }
    }

    /// Create a key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: &[u8; 32] = seed.try_into().map_err(|_| {
            CoreError::InvalidKey(format!("expected 32 seed bytes, got {}", seed.len()))
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(seed)))
    }

    /// Get the key ID
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key_id: self.key_id.clone(),
            verifying_key: self.verifying_key,
        }
    }

    /// Get the raw seed bytes
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the raw verifying key bytes
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign an assertion and wrap it in COSE_Sign1
    pub fn sign_assertion(&self, assertion: &Assertion) -> Result<SignedAssertion> {
        let payload = assertion.to_bytes()?;
        let cose = self.sign_cose(&payload)?;
        Ok(SignedAssertion { cose })
    }

    fn sign_cose(&self, payload: &[u8]) -> Result<CoseSign1> {
        let protected = HeaderBuilder::new()
            .algorithm(EDDSA_ALG)
            .key_id(self.key_id.as_bytes().to_vec())
            .build();

        let builder = CoseSign1Builder::new()
            .protected(protected)
            .payload(payload.to_vec());

        let signed_builder = builder.try_create_signature(&[], |data| {
            let signature = self.signing_key.sign(data);
            Ok::<_, CoreError>(signature.to_bytes().to_vec())
        })?;

        Ok(signed_builder.build())
    }
}

/// Ed25519 public key for verification
#[derive(Clone)]
pub struct PublicKey {
    key_id: String,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::InvalidKey(format!("expected 32 public key bytes, got {}", bytes.len()))
        })?;
        let verifying_key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key_id: key_fingerprint(bytes),
            verifying_key,
        })
    }

    /// Get the key ID
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Get the raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a signed assertion and extract the payload
    pub fn verify_assertion(&self, signed: &SignedAssertion) -> Result<Assertion> {
        self.verify_cose(&signed.cose)?;
        signed.extract_assertion()
    }

    fn verify_cose(&self, cose: &CoseSign1) -> Result<()> {
        let kid = &cose.protected.header.key_id;
        if !kid.is_empty() {
            let kid_str = String::from_utf8_lossy(kid);
            if kid_str != self.key_id {
                return Err(CoreError::SignatureInvalid(format!(
                    "Key ID mismatch: expected '{}', got '{}'",
                    self.key_id, kid_str
                )));
            }
        }

        let sig_structure = cose.tbs_data(&[]);

        let signature_bytes: [u8; 64] = cose
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::SignatureInvalid("Invalid signature length".into()))?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.verifying_key
            .verify(&sig_structure, &signature)
            .map_err(|e| CoreError::SignatureInvalid(e.to_string()))
    }
}
