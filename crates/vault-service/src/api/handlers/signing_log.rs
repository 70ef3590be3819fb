//! Signing Log Handler

use axum::extract::State;
use std::sync::Arc;
use vault_core::Action;

use crate::api::{respond, ApiResult, AppState};
use crate::core::{authorize_role, RequestContext};
use crate::storage::SigningLogEntry;

/// GET /v1/signinglog
///
/// Newest first, limited to the principal's accounts.
pub async fn list_signing_log(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> ApiResult<Vec<SigningLogEntry>> {
    authorize_role(&ctx.principal, Action::ReadSigningLog)?;
    respond("logs", state.store.list_signing_log(&ctx.principal).await?)
}
