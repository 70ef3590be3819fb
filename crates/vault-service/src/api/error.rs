//! API error types and responses

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};
use vault_auth::AuthError;

use super::Envelope;
use crate::core::{NonceError, PermissionDenied, SignError, SubstoreError};
use crate::keys::KeypairError;
use crate::storage::StorageError;

/// API error type
///
/// Each variant has a stable `error_code`; callers switch on the code, the
/// message is for humans.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No credential, or a credential that did not validate
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request-id: {0}")]
    NonceInvalid(String),

    #[error("Keypair disabled: {0}")]
    KeyDisabled(String),

    #[error("Keypair exists: {0}")]
    KeyExists(String),

    #[error("{0}")]
    StoresJson(String),

    #[error("{0}")]
    StoresSubstore(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("{message}")]
    DeletingStore { subcode: &'static str, message: String },

    #[error("Invalid request body: {0}")]
    DecodeJson(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Keypair not found")]
    KeypairNotFound,

    /// An account or model with the same name exists
    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable error code reported to callers
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) | ApiError::Forbidden(_) => "error-auth",
            ApiError::NonceInvalid(_) => "error-nonce-invalid",
            ApiError::KeyDisabled(_) => "error-key-disabled",
            ApiError::KeyExists(_) => "error-key-exists",
            ApiError::StoresJson(_) => "error-stores-json",
            ApiError::StoresSubstore(_) => "error-stores-substore",
            ApiError::Registration(_) => "error-registration",
            ApiError::DeletingStore { .. } => "error-deleting-store",
            ApiError::DecodeJson(_) => "error-decode-json",
            ApiError::AccountNotFound(_) => "error-account-not-found",
            ApiError::ModelNotFound(_) => "error-model-not-found",
            ApiError::KeypairNotFound => "error-keypair-not-found",
            ApiError::Duplicate(_) => "error-duplicate",
            ApiError::Internal(_) => "error-internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::KeyExists(_) | ApiError::Duplicate(_) => StatusCode::CONFLICT,
            ApiError::Registration(_) => StatusCode::BAD_GATEWAY,
            ApiError::AccountNotFound(_) | ApiError::ModelNotFound(_) | ApiError::KeypairNotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (subcode, message) = match &self {
            ApiError::DeletingStore { subcode, message } => (*subcode, message.clone()),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                ("", "Internal error".to_string())
            }
            other => ("", other.to_string()),
        };

        (status, Json(Envelope::<()>::error(code, subcode, message))).into_response()
    }
}

impl From<PermissionDenied> for ApiError {
    fn from(err: PermissionDenied) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Backend(detail) => ApiError::Internal(detail),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<NonceError> for ApiError {
    fn from(err: NonceError) -> Self {
        match err {
            NonceError::Invalid(reason) => ApiError::NonceInvalid(reason.to_string()),
            NonceError::TtlOutOfRange(ttl) => ApiError::Internal(format!("request-id lifetime {} is out of range", ttl)),
            NonceError::Storage(e) => e.into(),
        }
    }
}

impl From<KeypairError> for ApiError {
    fn from(err: KeypairError) -> Self {
        match err {
            KeypairError::Denied(e) => e.into(),
            e @ KeypairError::KeyExists { .. } => ApiError::KeyExists(e.to_string()),
            KeypairError::AccountNotFound(authority) => ApiError::AccountNotFound(authority),
            KeypairError::NotFound => ApiError::KeypairNotFound,
            KeypairError::InvalidMaterial(msg) => ApiError::DecodeJson(msg),
            KeypairError::Registration(msg) => ApiError::Registration(msg),
            KeypairError::Storage(e) => e.into(),
            KeypairError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<SubstoreError> for ApiError {
    fn from(err: SubstoreError) -> Self {
        match err {
            SubstoreError::Denied(e) => e.into(),
            SubstoreError::StoresJson(msg) => ApiError::StoresJson(msg),
            SubstoreError::Substore(msg) => ApiError::StoresSubstore(msg),
            SubstoreError::Deleting { subcode, message } => ApiError::DeletingStore { subcode, message },
            SubstoreError::AccountNotFound(id) => ApiError::AccountNotFound(id.to_string()),
            SubstoreError::Storage(e) => e.into(),
        }
    }
}

impl From<SignError> for ApiError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::KeyDisabled(name) => ApiError::KeyDisabled(name),
            e @ SignError::NonceRequired(_) => ApiError::NonceInvalid(e.to_string()),
            SignError::InvalidAssertion(e) => ApiError::DecodeJson(e.to_string()),
            e @ (SignError::Crypto(_) | SignError::Join(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected request body");
        ApiError::DecodeJson(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::DecodeJson(rejection.body_text())
    }
}

impl From<base64::DecodeError> for ApiError {
    fn from(err: base64::DecodeError) -> Self {
        ApiError::DecodeJson(format!("Invalid base64 encoding: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_envelope_fields() {
        let (status, json) = body(ApiError::StoresJson("The store IDs do not match".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "error-stores-json");
        assert_eq!(json["error_subcode"], "");
        assert_eq!(json["message"], "The store IDs do not match");
    }

    #[tokio::test]
    async fn test_deleting_store_subcode() {
        let (status, json) = body(ApiError::DeletingStore {
            subcode: "error-store-in-use",
            message: "in use".into(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error_code"], "error-deleting-store");
        assert_eq!(json["error_subcode"], "error-store-in-use");
    }

    #[tokio::test]
    async fn test_internal_detail_hidden() {
        let (status, json) = body(StorageError::Database("relation \"substore\" does not exist".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error_code"], "error-internal");
        assert_eq!(json["message"], "Internal error");
    }

    #[test]
    fn test_auth_statuses() {
        assert_eq!(ApiError::from(AuthError::MissingCredential).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden("x".into()).code(), "error-auth");
    }
}
