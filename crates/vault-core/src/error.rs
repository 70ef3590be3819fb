//! Error types for the vault core

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by keys, assertions and domain type parsing
#[derive(Error, Debug)]
pub enum CoreError {
    /// Assertion signature verification failed
    #[error("Assertion signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Key material has the wrong shape
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// An assertion is missing a header its kind requires
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// Unknown assertion kind
    #[error("Unknown assertion kind: {0}")]
    UnknownKind(String),

    /// Unknown role name
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// COSE encoding/decoding error
    #[error("COSE error: {0}")]
    CoseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::CryptoError(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<coset::CoseError> for CoreError {
    fn from(err: coset::CoseError) -> Self {
        CoreError::CoseError(format!("{:?}", err))
    }
}
