//! Serial Vault Server
//!
//! The serial vault signs device-identity assertions for brand accounts:
//! - Issues single-use request-ids that gate serial assertions
//! - Signs serial, model and system-user assertions with account keys
//! - Redirects models published to a store onto sub-store keypairs
//! - Manages account keypairs and registers them with the external store
//!
//! ## Tenancy
//!
//! Every principal carries a role and a set of accounts. One permission
//! evaluator gates every operation: the role must reach the action's minimum
//! and the account must be in the principal's set, unless the principal is a
//! Superuser.
//!
//! ## API Endpoints
//!
//! ### Signing
//! - `GET /health` - Liveness check
//! - `GET /v1/version` - Service version
//! - `POST /v1/request-id` - Issue a request-id
//! - `POST /v1/serial`, `POST /v1/model` - Sign with the account default key
//! - `POST /v1/pivot` - Look up a model's sub-store for a store
//! - `POST /v1/pivotserial`, `POST /v1/pivotmodel` - Sign with the sub-store key
//! - `POST /v1/assertions` - Sign a system-user assertion
//! - `POST /v1/session` - Exchange a credential for a session token
//!
//! ### Admin (also under `/api`)
//! - `/v1/accounts`, `/v1/accounts/{id}`, `/v1/accounts/{id}/models`
//! - `/v1/keypairs`, `/v1/keypairs/generate`, `/v1/keypairs/register`,
//!   `/v1/keypairs/{id}/enable`, `/v1/keypairs/{id}/disable`,
//!   `/v1/keypairs/status/{authority}/{name}`
//! - `/v1/accounts/{id}/stores`, `/v1/accounts/stores`, `/v1/accounts/stores/{id}`
//! - `/v1/signinglog`

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod keys;
pub mod storage;

pub use api::{create_router, AppState};
pub use config::{ConfigError, VaultConfig};
pub use keys::{HttpStoreRegistrar, StoreRegistrar};
pub use storage::{Datastore, MemoryStore};
