//! Keypair Management Handlers

use axum::extract::{
    rejection::{JsonRejection, PathRejection},
    Path, State,
};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{respond, ApiResult, AppState};
use crate::core::RequestContext;
use crate::keys::{KeyMaterial, KeypairInfo, KeypairStatus, RegistrationResult, StoreCredentials};

/// Request to generate a keypair
#[derive(Debug, Deserialize)]
pub struct GenerateKeypairRequest {
    #[serde(rename = "authority-id")]
    pub authority_id: String,
    #[serde(rename = "key-name")]
    pub key_name: String,
}

/// Request to import a keypair
#[derive(Deserialize)]
pub struct ImportKeypairRequest {
    #[serde(rename = "authority-id")]
    pub authority_id: String,
    #[serde(rename = "key-name")]
    pub key_name: String,
    /// Base64 Ed25519 seed
    #[serde(rename = "private-key")]
    pub private_key: String,
}

/// Request to register a keypair with the store
#[derive(Debug, Deserialize)]
pub struct RegisterKeypairRequest {
    #[serde(rename = "keypairID")]
    pub keypair_id: i64,
    #[serde(flatten)]
    pub credentials: StoreCredentials,
}

/// GET /v1/keypairs
pub async fn list_keypairs(State(state): State<Arc<AppState>>, ctx: RequestContext) -> ApiResult<Vec<KeypairInfo>> {
    let keypairs = state.keypairs.list(&ctx).await?;
    respond("keypairs", keypairs.iter().map(KeypairInfo::from).collect())
}

/// POST /v1/keypairs
///
/// Import key material; the keypair is stored disabled.
pub async fn import_keypair(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<ImportKeypairRequest>, JsonRejection>,
) -> ApiResult<KeypairInfo> {
    let Json(request) = payload?;
    let seed = STANDARD.decode(request.private_key.trim())?;

    let keypair = state
        .keypairs
        .create(&ctx, &request.authority_id, &request.key_name, KeyMaterial::Import(seed))
        .await?;
    respond("keypair", KeypairInfo::from(&keypair))
}

/// POST /v1/keypairs/generate
pub async fn generate_keypair(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<GenerateKeypairRequest>, JsonRejection>,
) -> ApiResult<KeypairInfo> {
    let Json(request) = payload?;
    let keypair = state
        .keypairs
        .create(&ctx, &request.authority_id, &request.key_name, KeyMaterial::Generate)
        .await?;
    respond("keypair", KeypairInfo::from(&keypair))
}

/// POST /v1/keypairs/{id}/enable
pub async fn enable_keypair(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<KeypairInfo> {
    let Path(id) = id?;
    let keypair = state.keypairs.enable(&ctx, id).await?;
    respond("keypair", KeypairInfo::from(&keypair))
}

/// POST /v1/keypairs/{id}/disable
pub async fn disable_keypair(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<KeypairInfo> {
    let Path(id) = id?;
    let keypair = state.keypairs.disable(&ctx, id).await?;
    respond("keypair", KeypairInfo::from(&keypair))
}

/// GET /v1/keypairs/status/{authority}/{name}
pub async fn keypair_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<KeypairStatus> {
    let Path((authority, name)) = path?;
    respond("status", state.keypairs.status_of(&ctx, &authority, &name).await?)
}

/// POST /v1/keypairs/register
pub async fn register_keypair(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<RegisterKeypairRequest>, JsonRejection>,
) -> ApiResult<RegistrationResult> {
    let Json(request) = payload?;
    let result = state
        .keypairs
        .register_with_external_store(&ctx, request.keypair_id, &request.credentials)
        .await?;
    respond("registration", result)
}
