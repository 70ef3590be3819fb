//! Account and Model Handlers

use axum::extract::{
    rejection::{JsonRejection, PathRejection},
    Path, State,
};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use vault_core::Action;

use crate::api::{respond, ApiError, ApiResult, AppState};
use crate::core::{authorize, authorize_role, RequestContext};
use crate::storage::{Account, Model, NewAccount, StorageError};

/// Request to set an account's default keypair
#[derive(Debug, Deserialize)]
pub struct DefaultKeypairRequest {
    #[serde(rename = "keypairID")]
    pub keypair_id: i64,
}

/// Request to register a model
#[derive(Debug, Deserialize)]
pub struct NewModelRequest {
    pub name: String,
}

fn duplicate(err: StorageError) -> ApiError {
    match err {
        StorageError::AlreadyExists(what) => ApiError::Duplicate(what),
        other => other.into(),
    }
}

async fn load_account(state: &AppState, id: i64) -> Result<Account, ApiError> {
    state
        .store
        .get_account(id)
        .await?
        .ok_or_else(|| ApiError::AccountNotFound(id.to_string()))
}

/// GET /v1/accounts
pub async fn list_accounts(State(state): State<Arc<AppState>>, ctx: RequestContext) -> ApiResult<Vec<Account>> {
    authorize_role(&ctx.principal, Action::ReadAccounts)?;

    let accounts = state
        .store
        .list_accounts()
        .await?
        .into_iter()
        .filter(|a| ctx.principal.can_act_for(a.id))
        .collect();

    respond("accounts", accounts)
}

/// POST /v1/accounts
///
/// Superuser only.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> ApiResult<Account> {
    authorize_role(&ctx.principal, Action::ManageAccounts)?;
    let Json(request) = payload?;

    if request.authority_id.trim().is_empty() {
        return Err(ApiError::DecodeJson("The authority ID must be entered".into()));
    }

    let account = state.store.create_account(request).await.map_err(duplicate)?;
    info!(account_id = account.id, principal = %ctx.principal.identity, "Account created");
    respond("account", account)
}

/// GET /v1/accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Account> {
    let Path(id) = id?;
    authorize(&ctx.principal, Action::ReadAccounts, id)?;
    respond("account", load_account(&state, id).await?)
}

/// PUT /v1/accounts/{id}/default-keypair
pub async fn set_default_keypair(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<DefaultKeypairRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let Path(id) = id?;
    authorize(&ctx.principal, Action::ManageKeypairs, id)?;
    let Json(request) = payload?;

    let account = load_account(&state, id).await?;
    let keypair = state
        .store
        .get_keypair(request.keypair_id)
        .await?
        .ok_or(ApiError::KeypairNotFound)?;
    if keypair.authority_id != account.authority_id {
        return Err(ApiError::StoresJson(
            "The keypair does not belong to the account".into(),
        ));
    }

    let account = state.store.set_default_keypair(id, keypair.id).await?;
    info!(account_id = id, keypair = keypair.id, principal = %ctx.principal.identity, "Default keypair set");
    respond("account", account)
}

/// GET /v1/accounts/{id}/models
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Model>> {
    let Path(id) = id?;
    authorize(&ctx.principal, Action::ReadModels, id)?;
    respond("models", state.store.list_models(id).await?)
}

/// POST /v1/accounts/{id}/models
pub async fn create_model(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<NewModelRequest>, JsonRejection>,
) -> ApiResult<Model> {
    let Path(id) = id?;
    authorize(&ctx.principal, Action::ManageModels, id)?;
    let Json(request) = payload?;

    if request.name.trim().is_empty() {
        return Err(ApiError::DecodeJson("The model name must be entered".into()));
    }
    load_account(&state, id).await?;

    let model = state.store.create_model(id, &request.name).await.map_err(duplicate)?;
    info!(account_id = id, model = %model.name, principal = %ctx.principal.identity, "Model created");
    respond("model", model)
}
