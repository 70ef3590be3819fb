//! Sub-store Handlers

use axum::extract::{
    rejection::{JsonRejection, PathRejection},
    Path, State,
};
use axum::Json;
use std::sync::Arc;

use crate::api::{respond, ApiResult, AppState, Envelope};
use crate::core::RequestContext;
use crate::storage::Substore;

/// GET /v1/accounts/{id}/stores
pub async fn list_substores(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Substore>> {
    let Path(account_id) = id?;
    respond("substores", state.resolver.list(&ctx, account_id).await?)
}

/// POST /v1/accounts/stores
pub async fn create_substore(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Substore>, JsonRejection>,
) -> ApiResult<Substore> {
    let Json(store) = payload?;
    respond("substore", state.resolver.create(&ctx, store).await?)
}

/// PUT /v1/accounts/stores/{id}
///
/// The path ID must match the ID in the body.
pub async fn update_substore(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Substore>, JsonRejection>,
) -> ApiResult<Substore> {
    let Path(id) = id?;
    let Json(store) = payload?;
    respond("substore", state.resolver.update(&ctx, id, store).await?)
}

/// DELETE /v1/accounts/stores/{id}
pub async fn delete_substore(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    state.resolver.delete(&ctx, id).await?;
    Ok(Json(Envelope::done()))
}
