//! Session Token Handler

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::api::{respond, ApiResult, AppState};
use crate::core::RequestContext;

/// An issued session token
#[derive(Serialize)]
pub struct SessionBody {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /v1/session
///
/// Exchange the presented credential for a session token for the same user.
pub async fn create_session(State(state): State<Arc<AppState>>, ctx: RequestContext) -> ApiResult<SessionBody> {
    let now = state.clock.now();
    let token = state.sessions.issue(&ctx.principal.identity, now)?;

    info!(principal = %ctx.principal.identity, api_call = ctx.api_call, "Session token issued");

    respond(
        "session",
        SessionBody {
            token,
            expires_at: now + state.config.session_ttl,
        },
    )
}
