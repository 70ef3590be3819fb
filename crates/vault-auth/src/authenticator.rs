//! Authenticator - routes credentials to the matching handler

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};
use crate::types::{CredentialType, Credentials, ValidatedCredential};

/// Trait for credential handlers
///
/// Each handler validates a specific type of credential and resolves the
/// principal behind it.
#[async_trait]
pub trait CredentialHandler: Send + Sync {
    /// Get the type of credential this handler processes
    fn credential_type(&self) -> CredentialType;

    /// Validate a credential and resolve its principal
    ///
    /// # Arguments
    /// * `credential` - The raw credential string
    ///
    /// # Returns
    /// * `Ok(ValidatedCredential)` - Validated credential with principal
    /// * `Err(AuthError)` - If validation fails
    async fn validate(&self, credential: &str) -> Result<ValidatedCredential>;

    /// Get a description of this handler (for logging)
    fn description(&self) -> &str {
        "credential handler"
    }
}

#[async_trait]
impl<H: CredentialHandler + ?Sized> CredentialHandler for Arc<H> {
    fn credential_type(&self) -> CredentialType {
        (**self).credential_type()
    }

    async fn validate(&self, credential: &str) -> Result<ValidatedCredential> {
        (**self).validate(credential).await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Authenticator - routes credentials to handlers
pub struct Authenticator {
    handlers: HashMap<CredentialType, Arc<dyn CredentialHandler>>,
}

impl Authenticator {
    /// Create a new authenticator with no handlers
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Start a builder
    pub fn builder() -> AuthenticatorBuilder {
        AuthenticatorBuilder::new()
    }

    /// Register a credential handler
    pub fn register_handler<H: CredentialHandler + 'static>(&mut self, handler: H) {
        let credential_type = handler.credential_type();
        info!(
            credential_type = %credential_type,
            description = handler.description(),
            "Registered credential handler"
        );
        self.handlers.insert(credential_type, Arc::new(handler));
    }

    /// Validate a single credential of a known type
    pub async fn validate(
        &self,
        credential: &str,
        credential_type: CredentialType,
    ) -> Result<ValidatedCredential> {
        let handler = self.handlers.get(&credential_type).ok_or_else(|| {
            warn!(credential_type = %credential_type, "No handler for credential type");
            AuthError::ValidationFailed(format!(
                "No handler registered for credential type: {}",
                credential_type
            ))
        })?;

        let result = handler.validate(credential).await;

        match &result {
            Ok(validated) => {
                debug!(
                    credential_type = %credential_type,
                    principal = %validated.principal.identity,
                    role = %validated.principal.role,
                    "Credential validated"
                );
            }
            Err(e) => {
                warn!(
                    credential_type = %credential_type,
                    error = %e,
                    "Credential validation failed"
                );
            }
        }

        result
    }

    /// Resolve the principal behind a request's credentials
    ///
    /// A bearer token takes precedence over an API key. When a `user` header
    /// accompanies an API key it must name the key's owner.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<ValidatedCredential> {
        let (credential, credential_type) =
            credentials.primary().ok_or(AuthError::MissingCredential)?;

        let validated = self.validate(credential, credential_type).await?;

        if credential_type == CredentialType::ApiKey {
            if let Some(user) = credentials.user.as_deref().filter(|u| !u.is_empty()) {
                if user != validated.principal.identity {
                    warn!(
                        claimed = %user,
                        owner = %validated.principal.identity,
                        "API key presented with mismatched user"
                    );
                    return Err(AuthError::UserMismatch);
                }
            }
        }

        Ok(validated)
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating an Authenticator with handlers
pub struct AuthenticatorBuilder {
    authenticator: Authenticator,
}

impl AuthenticatorBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            authenticator: Authenticator::new(),
        }
    }

    /// Add a credential handler
    pub fn with_handler<H: CredentialHandler + 'static>(mut self, handler: H) -> Self {
        self.authenticator.register_handler(handler);
        self
    }

    /// Build the authenticator
    pub fn build(self) -> Authenticator {
        self.authenticator
    }
}

impl Default for AuthenticatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
