//! Error types for credential validation

use thiserror::Error;

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while resolving a principal
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential was presented
    #[error("No credentials supplied")]
    MissingCredential,

    /// Credential validation failed
    #[error("Credential validation failed: {0}")]
    ValidationFailed(String),

    /// Credential has expired
    #[error("Credential expired at {0}")]
    Expired(String),

    /// Invalid credential format
    #[error("Invalid credential format: {0}")]
    InvalidFormat(String),

    /// Invalid signature
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// API key not found
    #[error("API key not found")]
    ApiKeyNotFound,

    /// API key revoked
    #[error("API key has been revoked")]
    ApiKeyRevoked,

    /// The `user` header names someone other than the key owner
    #[error("User does not own the API key")]
    UserMismatch,

    /// The token subject is not a known user
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Backing store failed
    #[error("Credential backend error: {0}")]
    Backend(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired("session token expired".into()),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature(err.to_string()),
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                AuthError::InvalidFormat(err.to_string())
            }
            _ => AuthError::ValidationFailed(err.to_string()),
        }
    }
}
