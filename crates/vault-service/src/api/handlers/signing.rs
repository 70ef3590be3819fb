//! Signing Handlers
//!
//! Request-ID issuance and the assertion endpoints used by devices in the
//! factory. Every sign request names its brand; the brand's account is the
//! account the principal must be allowed to sign for.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Duration;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use vault_core::assertion::headers;
use vault_core::{Action, AssertionKind};

use crate::api::{respond, ApiError, ApiResult, AppState};
use crate::core::{authorize, authorize_role, RequestContext, Resolution, SignedOutput};
use crate::storage::{Account, NewSigningLogEntry};

/// Validity of a system-user assertion when `until` is not given
const SYSTEM_USER_VALIDITY_DAYS: i64 = 365;

/// Free-form header set of a sign request
type Payload = BTreeMap<String, Value>;

/// Signed assertion as returned to the caller
#[derive(Debug, Serialize)]
pub struct SignedAssertionBody {
    /// Base64 COSE_Sign1 bytes
    pub encoded: String,
    #[serde(rename = "sign-key-id")]
    pub key_id: String,
    pub headers: BTreeMap<String, Value>,
}

impl SignedAssertionBody {
    fn from_output(output: &SignedOutput) -> Result<Self, ApiError> {
        Ok(Self {
            encoded: output
                .signed
                .to_base64()
                .map_err(|e| ApiError::Internal(e.to_string()))?,
            key_id: output.key_id.clone(),
            headers: output.assertion.headers.clone(),
        })
    }
}

/// Where a model is redirected to for a store
#[derive(Debug, Serialize)]
pub struct PivotBody {
    #[serde(rename = "brand-id")]
    pub brand_id: String,
    pub model: String,
    pub store: String,
    #[serde(rename = "sign-key-id")]
    pub key_id: String,
    #[serde(rename = "substore-id")]
    pub substore_id: i64,
}

fn take_string(payload: &mut Payload, name: &str) -> Option<String> {
    match payload.remove(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn header_string(payload: &Payload, name: &str) -> Result<String, ApiError> {
    payload
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::DecodeJson(format!("The '{}' header must be entered", name)))
}

/// Find the brand's account and check the principal may sign for it
async fn signing_account(state: &AppState, ctx: &RequestContext, payload: &Payload) -> Result<Account, ApiError> {
    let brand = header_string(payload, headers::BRAND_ID)?;
    let account = state
        .store
        .get_account_by_authority(&brand)
        .await?
        .ok_or(ApiError::AccountNotFound(brand))?;

    authorize(&ctx.principal, Action::SignAssertion, account.id)?;
    Ok(account)
}

async fn require_model(state: &AppState, account: &Account, model: &str) -> Result<(), ApiError> {
    state
        .store
        .get_model(account.id, model)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::ModelNotFound(format!("{}/{}", account.authority_id, model)))
}

/// Resolve the keypair, redirecting through a sub-store when `pivot` is set
async fn resolve(
    state: &AppState,
    account: &Account,
    model: &str,
    store: Option<&str>,
    pivot: bool,
) -> Result<Resolution, ApiError> {
    if !pivot {
        return Ok(state.resolver.resolve(account.id, model, None).await?);
    }

    let store = store.ok_or_else(|| ApiError::StoresJson("The store must be entered".into()))?;
    let resolution = state.resolver.resolve(account.id, model, Some(store)).await?;
    if !resolution.policy.is_pivot() {
        return Err(ApiError::StoresJson(format!(
            "No sub-store for model '{}' in store '{}'",
            model, store
        )));
    }
    Ok(resolution)
}

/// Shared flow of the serial and model endpoints
async fn sign_device_assertion(
    state: &AppState,
    ctx: &RequestContext,
    kind: AssertionKind,
    mut payload: Payload,
    pivot: bool,
) -> ApiResult<SignedAssertionBody> {
    let account = signing_account(state, ctx, &payload).await?;
    let model = header_string(&payload, headers::MODEL)?;
    require_model(state, &account, &model).await?;

    let store = take_string(&mut payload, headers::STORE);
    let request_id = take_string(&mut payload, headers::REQUEST_ID);

    let resolution = resolve(state, &account, &model, store.as_deref(), pivot).await?;
    if let Some(store) = &resolution.policy.store {
        payload.insert(headers::MODEL.into(), Value::from(resolution.policy.model_name.clone()));
        payload.insert(headers::STORE.into(), Value::from(store.clone()));
    }

    let nonce = if kind.requires_nonce() {
        let token = request_id.ok_or_else(|| ApiError::NonceInvalid("missing".into()))?;
        Some(state.nonces.redeem(&token).await?)
    } else {
        None
    };

    let serial = payload
        .get(headers::SERIAL)
        .and_then(Value::as_str)
        .map(str::to_string);

    let output = state.signer.sign(kind, payload, &resolution.keypair, nonce).await?;
    record(state, &account, kind, model, serial, &resolution, &output).await?;

    info!(
        kind = %kind,
        brand = %account.authority_id,
        key_id = %output.key_id,
        substore = ?resolution.policy.substore_id,
        principal = %ctx.principal.identity,
        "Assertion signed"
    );

    respond("assertion", SignedAssertionBody::from_output(&output)?)
}

async fn record(
    state: &AppState,
    account: &Account,
    kind: AssertionKind,
    model: String,
    serial: Option<String>,
    resolution: &Resolution,
    output: &SignedOutput,
) -> Result<(), ApiError> {
    state
        .store
        .append_signing_log(NewSigningLogEntry {
            account_id: account.id,
            kind,
            model,
            serial,
            key_id: output.key_id.clone(),
            substore_id: resolution.policy.substore_id,
            nonce: output.nonce.clone(),
            created_at: state.clock.now(),
        })
        .await?;
    Ok(())
}

/// POST /v1/request-id
///
/// Issue a single-use request-id for a serial assertion.
pub async fn request_id(State(state): State<Arc<AppState>>, ctx: RequestContext) -> ApiResult<String> {
    authorize_role(&ctx.principal, Action::SignAssertion)?;
    let nonce = state.nonces.issue().await?;
    respond("request-id", nonce.token)
}

/// POST /v1/serial
pub async fn sign_serial(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Payload>, JsonRejection>,
) -> ApiResult<SignedAssertionBody> {
    let Json(payload) = payload?;
    sign_device_assertion(&state, &ctx, AssertionKind::Serial, payload, false).await
}

/// POST /v1/model
pub async fn sign_model(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Payload>, JsonRejection>,
) -> ApiResult<SignedAssertionBody> {
    let Json(payload) = payload?;
    sign_device_assertion(&state, &ctx, AssertionKind::Model, payload, false).await
}

/// POST /v1/pivotmodel
pub async fn sign_pivot_model(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Payload>, JsonRejection>,
) -> ApiResult<SignedAssertionBody> {
    let Json(payload) = payload?;
    sign_device_assertion(&state, &ctx, AssertionKind::Model, payload, true).await
}

/// POST /v1/pivotserial
pub async fn sign_pivot_serial(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Payload>, JsonRejection>,
) -> ApiResult<SignedAssertionBody> {
    let Json(payload) = payload?;
    sign_device_assertion(&state, &ctx, AssertionKind::Serial, payload, true).await
}

/// POST /v1/pivot
///
/// Report the sub-store a model is redirected to for a store, without signing.
pub async fn pivot(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Payload>, JsonRejection>,
) -> ApiResult<PivotBody> {
    let Json(mut payload) = payload?;
    let account = signing_account(&state, &ctx, &payload).await?;
    let model = header_string(&payload, headers::MODEL)?;
    require_model(&state, &account, &model).await?;

    let store = take_string(&mut payload, headers::STORE);
    let resolution = resolve(&state, &account, &model, store.as_deref(), true).await?;

    respond(
        "pivot",
        PivotBody {
            brand_id: account.authority_id,
            model: resolution.policy.model_name,
            store: resolution.policy.store.unwrap_or_default(),
            key_id: resolution.keypair.key_id,
            substore_id: resolution.policy.substore_id.unwrap_or_default(),
        },
    )
}

/// POST /v1/assertions
///
/// Sign a system-user assertion with the brand's default keypair.
pub async fn sign_system_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    payload: Result<Json<Payload>, JsonRejection>,
) -> ApiResult<SignedAssertionBody> {
    let Json(mut payload) = payload?;
    let account = signing_account(&state, &ctx, &payload).await?;

    let models: Vec<String> = match payload.get(headers::MODELS) {
        Some(Value::Array(models)) if !models.is_empty() => models
            .iter()
            .map(|m| {
                m.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::DecodeJson("Models must be strings".into()))
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(ApiError::DecodeJson("The 'models' header must list at least one model".into())),
    };
    for model in &models {
        require_model(&state, &account, model).await?;
    }

    payload.remove(headers::REQUEST_ID);
    payload.remove(headers::STORE);

    let now = state.clock.now();
    payload
        .entry(headers::SINCE.to_string())
        .or_insert_with(|| Value::from(now.to_rfc3339()));
    payload
        .entry(headers::UNTIL.to_string())
        .or_insert_with(|| Value::from((now + Duration::days(SYSTEM_USER_VALIDITY_DAYS)).to_rfc3339()));

    let resolution = state.resolver.resolve(account.id, &models[0], None).await?;
    let output = state
        .signer
        .sign(AssertionKind::SystemUser, payload, &resolution.keypair, None)
        .await?;
    record(
        &state,
        &account,
        AssertionKind::SystemUser,
        models.join(","),
        None,
        &resolution,
        &output,
    )
    .await?;

    info!(
        brand = %account.authority_id,
        key_id = %output.key_id,
        principal = %ctx.principal.identity,
        "System-user assertion signed"
    );

    respond("assertion", SignedAssertionBody::from_output(&output)?)
}
