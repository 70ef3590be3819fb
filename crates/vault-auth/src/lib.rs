//! Vault Auth
//!
//! Turns the credentials a caller presents (an API key or a session token)
//! into a validated [`vault_core::Principal`]. The service only ever sees the
//! principal; it never handles raw credentials past this crate.
//!
//! ## Architecture
//!
//! The [`Authenticator`] keeps a registry of credential handlers, one per
//! credential type:
//!
//! - **API key**: looked up in an [`handlers::ApiKeyBackend`]; the owning
//!   user's role and accounts become the principal
//! - **Session**: HS256 tokens issued at login and resolved against a
//!   [`handlers::UserDirectory`]
//!
//! ## Usage
//!
//! ```ignore
//! use vault_auth::{Authenticator, Credentials, handlers::*};
//!
//! let auth = Authenticator::builder()
//!     .with_handler(ApiKeyHandler::new(backend))
//!     .with_handler(SessionHandler::new(secret, ttl, directory))
//!     .build();
//!
//! let validated = auth.authenticate(&Credentials::api_key("k3y")).await?;
//! println!("Principal: {}", validated.principal.identity);
//! ```

pub mod authenticator;
pub mod error;
pub mod handlers;
pub mod types;

pub use authenticator::{Authenticator, AuthenticatorBuilder, CredentialHandler};
pub use error::{AuthError, Result};
pub use types::{CredentialType, Credentials, ValidatedCredential};
