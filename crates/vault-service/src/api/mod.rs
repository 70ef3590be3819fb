//! API module for the serial vault

pub mod context;
pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Response body shared by every endpoint
///
/// The payload, if any, is flattened in under its own key next to the
/// status fields.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub error_code: &'static str,
    pub error_subcode: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub payload: BTreeMap<&'static str, T>,
}

impl<T: Serialize> Envelope<T> {
    /// Successful response carrying `value` under `key`
    pub fn ok(key: &'static str, value: T) -> Self {
        Self {
            success: true,
            error_code: "",
            error_subcode: "",
            message: String::new(),
            payload: BTreeMap::from([(key, value)]),
        }
    }

    /// Successful response with no payload
    pub fn done() -> Self {
        Self {
            success: true,
            error_code: "",
            error_subcode: "",
            message: String::new(),
            payload: BTreeMap::new(),
        }
    }

    /// Failed response
    pub fn error(code: &'static str, subcode: &'static str, message: String) -> Self {
        Self {
            success: false,
            error_code: code,
            error_subcode: subcode,
            message,
            payload: BTreeMap::new(),
        }
    }
}

/// Result of a handler returning an envelope
pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Wrap a payload in a successful envelope
pub fn respond<T: Serialize>(key: &'static str, value: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(key, value)))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// GET /v1/version
pub async fn version() -> ApiResult<&'static str> {
    respond("version", env!("CARGO_PKG_VERSION"))
}

/// Routes for signing devices
fn signing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/version", get(version))
        .route("/request-id", post(handlers::request_id))
        .route("/serial", post(handlers::sign_serial))
        .route("/model", post(handlers::sign_model))
        .route("/pivot", post(handlers::pivot))
        .route("/pivotmodel", post(handlers::sign_pivot_model))
        .route("/pivotserial", post(handlers::sign_pivot_serial))
        .route("/assertions", post(handlers::sign_system_user))
        .route("/session", post(handlers::create_session))
}

/// Admin routes, served under both `/v1` and `/api`
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Accounts and models
        .route("/accounts", get(handlers::list_accounts).post(handlers::create_account))
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/accounts/{id}/default-keypair", put(handlers::set_default_keypair))
        .route(
            "/accounts/{id}/models",
            get(handlers::list_models).post(handlers::create_model),
        )
        // Keypairs
        .route("/keypairs", get(handlers::list_keypairs).post(handlers::import_keypair))
        .route("/keypairs/generate", post(handlers::generate_keypair))
        .route("/keypairs/register", post(handlers::register_keypair))
        .route("/keypairs/{id}/enable", post(handlers::enable_keypair))
        .route("/keypairs/{id}/disable", post(handlers::disable_keypair))
        .route("/keypairs/status/{authority}/{name}", get(handlers::keypair_status))
        // Sub-stores
        .route("/accounts/{id}/stores", get(handlers::list_substores))
        .route("/accounts/stores", post(handlers::create_substore))
        .route(
            "/accounts/stores/{id}",
            put(handlers::update_substore).delete(handlers::delete_substore),
        )
        // Signing log
        .route("/signinglog", get(handlers::list_signing_log))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration for browser-based admin clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = admin_routes();

    Router::new()
        .route("/health", get(health))
        .nest("/v1", signing_routes().merge(admin.clone()))
        .nest("/api", admin)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
