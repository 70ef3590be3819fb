//! Request context extraction
//!
//! Every authenticated handler takes a [`RequestContext`] argument; requests
//! without a valid credential are rejected here with `error-auth`.

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use std::sync::Arc;
use vault_auth::Credentials;

use super::error::ApiError;
use super::state::AppState;
use crate::core::RequestContext;

/// Header carrying an API key
pub const API_KEY_HEADER: &str = "api-key";

/// Header naming the user an API key is presented for
pub const USER_HEADER: &str = "user";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Pull the raw credentials off the request headers
pub fn credentials_from(headers: &HeaderMap) -> Credentials {
    let bearer = header(headers, AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim().to_string()));

    Credentials {
        api_key: header(headers, API_KEY_HEADER),
        user: header(headers, USER_HEADER),
        bearer,
    }
}

impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let credentials = credentials_from(&parts.headers);
        let validated = state.authenticator.authenticate(&credentials).await?;

        Ok(if validated.is_api_call() {
            RequestContext::api(validated.principal)
        } else {
            RequestContext::new(validated.principal)
        })
    }
}
