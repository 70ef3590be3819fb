//! Credential handlers for different credential types

pub mod apikey;
pub mod session;

pub use apikey::{ApiKeyBackend, ApiKeyHandler, ApiKeyInfo, InMemoryApiKeyBackend};
pub use session::{SessionClaims, SessionHandler, UserDirectory, SESSION_ISSUER};
