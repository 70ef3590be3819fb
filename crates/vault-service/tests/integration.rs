//! Integration Tests for the Serial Vault
//!
//! These tests drive the HTTP router end to end:
//! - Signing flows (model, serial, pivot, system-user)
//! - Sub-store management scoped to accounts
//! - Keypair lifecycle and registration
//! - Sessions, response envelope and route aliases

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::json;
use vault_core::{PublicKey, Role, SignedAssertion};

use common::{assert_error, serial_body, substore_body, Harness};

// =============================================================================
// Service Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_and_version_unauthenticated() {
    let h = Harness::new();

    let (status, body) = h.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = h.call(Method::GET, "/v1/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_credentials_rejected() {
    let h = Harness::new();
    let (status, body) = h.call(Method::GET, "/v1/accounts", None, None).await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "error-auth");

    let (status, body) = h.get("/v1/accounts", "no-such-key").await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED, "error-auth");
}

#[tokio::test]
async fn test_envelope_on_success() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("alice", Role::Admin, &[brand.account.id]).await;

    let (status, body) = h.get("/v1/accounts", &key).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["error_code"], "");
    assert_eq!(body["error_subcode"], "");
    assert_eq!(body["message"], "");
    assert_eq!(body["accounts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_routes_under_api_prefix() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("alice", Role::Admin, &[brand.account.id]).await;

    let (status, body) = h.get(&format!("/api/accounts/{}", brand.account.id), &key).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["account"]["authority_id"], "acme");
}

// =============================================================================
// Signing
// =============================================================================

#[tokio::test]
async fn test_model_assertion_signed_with_default_key() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("factory", Role::Standard, &[brand.account.id]).await;

    let (status, body) = h
        .post(
            "/v1/model",
            &key,
            json!({"brand-id": "acme", "model": "m1", "gadget": "pi3", "kernel": "pi2-kernel"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let assertion = &body["assertion"];
    assert_eq!(assertion["sign-key-id"], brand.default_key.key_id.as_str());
    assert_eq!(assertion["headers"]["type"], "model");
    assert_eq!(assertion["headers"]["authority-id"], "acme");
    assert_eq!(assertion["headers"]["gadget"], "pi3");

    let signed = SignedAssertion::from_base64(assertion["encoded"].as_str().unwrap()).unwrap();
    let public = PublicKey::from_bytes(&brand.default_key.public_key).unwrap();
    let verified = public.verify_assertion(&signed).unwrap();
    assert_eq!(verified.header_str("model"), Some("m1"));
}

#[tokio::test]
async fn test_serial_assertion_consumes_request_id() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("factory", Role::Standard, &[brand.account.id]).await;

    let request_id = h.request_id(&key).await;
    let (status, body) = h.post("/v1/serial", &key, serial_body("acme", "A001", &request_id)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["assertion"]["headers"]["request-id"], request_id.as_str());
    assert_eq!(body["assertion"]["headers"]["serial"], "A001");

    let (status, body) = h.post("/v1/serial", &key, serial_body("acme", "A002", &request_id)).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-nonce-invalid");
}

#[tokio::test]
async fn test_serial_without_request_id_rejected() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("factory", Role::Standard, &[brand.account.id]).await;

    let mut body = serial_body("acme", "A001", "");
    body.as_object_mut().unwrap().remove("request-id");
    let (status, body) = h.post("/v1/serial", &key, body).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-nonce-invalid");
}

#[tokio::test]
async fn test_unknown_brand_and_model() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("factory", Role::Standard, &[brand.account.id]).await;

    let (status, body) = h.post("/v1/model", &key, json!({"brand-id": "nobody", "model": "m1"})).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "error-account-not-found");

    let (status, body) = h.post("/v1/model", &key, json!({"brand-id": "acme", "model": "m9"})).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "error-model-not-found");
}

#[tokio::test]
async fn test_malformed_body() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("factory", Role::Standard, &[brand.account.id]).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/model")
        .header("api-key", key.as_str())
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-decode-json");
}

#[tokio::test]
async fn test_system_user_assertion() {
    let h = Harness::new();
    let brand = h.brand("acme").await;
    let key = h.user("factory", Role::Standard, &[brand.account.id]).await;

    let (status, body) = h
        .post(
            "/v1/assertions",
            &key,
            json!({
                "brand-id": "acme",
                "models": ["m1"],
                "username": "installer",
                "name": "Installer",
                "email": "installer@example.com",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let headers = &body["assertion"]["headers"];
    assert_eq!(headers["type"], "system-user");
    assert!(headers["since"].is_string());
    assert!(headers["until"].is_string());
}

// =============================================================================
// Sub-stores
// =============================================================================

#[tokio::test]
async fn test_substore_scoped_to_account() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let b = h.brand("other").await;
    let store_key = h.store_key("acme", "store").await;
    let admin_a = h.user("admin-a", Role::Admin, &[a.account.id]).await;
    let admin_b = h.user("admin-b", Role::Admin, &[b.account.id]).await;

    let (status, body) = h
        .post("/v1/accounts/stores", &admin_a, substore_body(0, a.account.id, store_key.id))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let created_id = body["substore"]["id"].as_i64().unwrap();

    let (status, body) = h.get(&format!("/v1/accounts/{}/stores", a.account.id), &admin_a).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["substores"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], created_id);
    assert_eq!(listed[0]["store"], "brand-x");

    let (status, body) = h.get(&format!("/v1/accounts/{}/stores", b.account.id), &admin_b).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["substores"].as_array().unwrap().is_empty());

    // Admin of the other account is refused and nothing changes
    let mut update = substore_body(created_id, a.account.id, store_key.id);
    update["modelname"] = json!("hijacked");
    let (status, body) = h
        .put(&format!("/v1/accounts/stores/{}", created_id), &admin_b, update)
        .await;
    assert_error(status, &body, StatusCode::FORBIDDEN, "error-auth");

    let (_, body) = h.get(&format!("/v1/accounts/{}/stores", a.account.id), &admin_a).await;
    assert_eq!(body["substores"][0]["modelname"], "m1-pivot");
}

#[tokio::test]
async fn test_substore_update_id_mismatch() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let store_key = h.store_key("acme", "store").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;

    let (_, body) = h
        .post("/v1/accounts/stores", &admin, substore_body(0, a.account.id, store_key.id))
        .await;
    let id = body["substore"]["id"].as_i64().unwrap();

    let mut update = substore_body(id, a.account.id, store_key.id);
    update["modelname"] = json!("renamed");
    let (status, body) = h
        .put(&format!("/v1/accounts/stores/{}", id + 1000), &admin, update.clone())
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-stores-json");
    assert_eq!(body["message"], "The store IDs do not match");

    let (status, body) = h.put(&format!("/v1/accounts/stores/{}", id), &admin, update).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["substore"]["modelname"], "renamed");
}

#[tokio::test]
async fn test_pivot_flow_and_delete_in_use() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let store_key = h.store_key("acme", "store").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;

    let (_, body) = h
        .post("/v1/accounts/stores", &admin, substore_body(0, a.account.id, store_key.id))
        .await;
    let id = body["substore"]["id"].as_i64().unwrap();

    let (status, body) = h
        .post("/v1/pivot", &admin, json!({"brand-id": "acme", "model": "m1", "store": "brand-x"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["pivot"]["model"], "m1-pivot");
    assert_eq!(body["pivot"]["substore-id"], id);
    assert_eq!(body["pivot"]["sign-key-id"], store_key.key_id.as_str());

    let (status, body) = h
        .post(
            "/v1/pivotmodel",
            &admin,
            json!({"brand-id": "acme", "model": "m1", "store": "brand-x"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["assertion"]["sign-key-id"], store_key.key_id.as_str());
    assert_eq!(body["assertion"]["headers"]["model"], "m1-pivot");
    assert_eq!(body["assertion"]["headers"]["store"], "brand-x");

    // The signing log now references the sub-store
    let (status, body) = h.delete(&format!("/v1/accounts/stores/{}", id), &admin).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-deleting-store");
    assert_eq!(body["error_subcode"], "error-store-in-use");

    let (status, body) = h.delete("/v1/accounts/stores/999999", &admin).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-deleting-store");
    assert_eq!(body["error_subcode"], "error-store-not-found");
}

#[tokio::test]
async fn test_pivot_serial_flow() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let store_key = h.store_key("acme", "store").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;
    h.post("/v1/accounts/stores", &admin, substore_body(0, a.account.id, store_key.id))
        .await;

    let request_id = h.request_id(&admin).await;
    let mut body = serial_body("acme", "S1", &request_id);
    body["store"] = json!("brand-x");
    let (status, body) = h.post("/v1/pivotserial", &admin, body).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["assertion"]["headers"]["model"], "m1-pivot");
    assert_eq!(body["assertion"]["sign-key-id"], store_key.key_id.as_str());
}

#[tokio::test]
async fn test_pivot_without_substore() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;

    let (status, body) = h
        .post("/v1/pivotmodel", &admin, json!({"brand-id": "acme", "model": "m1", "store": "nowhere"}))
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-stores-json");
}

#[tokio::test]
async fn test_delete_substore() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let store_key = h.store_key("acme", "store").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;

    let (_, body) = h
        .post("/v1/accounts/stores", &admin, substore_body(0, a.account.id, store_key.id))
        .await;
    let id = body["substore"]["id"].as_i64().unwrap();

    let (status, body) = h.delete(&format!("/v1/accounts/stores/{}", id), &admin).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);

    let (_, body) = h.get(&format!("/v1/accounts/{}/stores", a.account.id), &admin).await;
    assert!(body["substores"].as_array().unwrap().is_empty());
}

// =============================================================================
// Keypairs
// =============================================================================

#[tokio::test]
async fn test_keypair_lifecycle() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;

    let (status, body) = h
        .post("/v1/keypairs/generate", &admin, json!({"authority-id": "acme", "key-name": "k2"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["keypair"]["Active"], false);
    assert!(body["keypair"].get("material").is_none());
    let id = body["keypair"]["ID"].as_i64().unwrap();

    let (_, body) = h.get("/v1/keypairs/status/acme/k2", &admin).await;
    assert_eq!(body["status"], "disabled");

    let (status, body) = h.call(Method::POST, &format!("/v1/keypairs/{}/enable", id), Some(admin.as_str()), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (_, body) = h.get("/v1/keypairs/status/acme/k2", &admin).await;
    assert_eq!(body["status"], "enabled");

    let (status, body) = h
        .post("/v1/keypairs/register", &admin, json!({"keypairID": id, "macaroon": "root"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (_, body) = h.get("/v1/keypairs/status/acme/k2", &admin).await;
    assert_eq!(body["status"], "registered");

    let (status, body) = h
        .post("/v1/keypairs/generate", &admin, json!({"authority-id": "acme", "key-name": "k2"}))
        .await;
    assert_error(status, &body, StatusCode::CONFLICT, "error-key-exists");

    let (_, body) = h.get("/v1/keypairs", &admin).await;
    assert_eq!(body["keypairs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_import_keypair() {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let h = Harness::new();
    let a = h.brand("acme").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;
    let seed = [3u8; 32];

    let (status, body) = h
        .post(
            "/v1/keypairs",
            &admin,
            json!({"authority-id": "acme", "key-name": "imported", "private-key": STANDARD.encode(seed)}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(
        body["keypair"]["KeyID"],
        vault_core::KeyPair::from_seed(&seed).unwrap().key_id()
    );

    let (status, body) = h
        .post(
            "/v1/keypairs",
            &admin,
            json!({"authority-id": "acme", "key-name": "broken", "private-key": "%%%"}),
        )
        .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "error-decode-json");
}

// =============================================================================
// Accounts, Sessions, Signing Log
// =============================================================================

#[tokio::test]
async fn test_account_creation_superuser_only() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;
    let root = h.user("root", Role::Superuser, &[]).await;

    let new_account = json!({"authority_id": "newco", "name": "NewCo"});
    let (status, body) = h.post("/v1/accounts", &admin, new_account.clone()).await;
    assert_error(status, &body, StatusCode::FORBIDDEN, "error-auth");

    let (status, body) = h.post("/v1/accounts", &root, new_account.clone()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (status, body) = h.post("/v1/accounts", &root, new_account).await;
    assert_error(status, &body, StatusCode::CONFLICT, "error-duplicate");

    let (_, body) = h.get("/v1/accounts", &root).await;
    assert_eq!(body["accounts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_models_and_default_keypair() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let admin = h.user("admin", Role::Admin, &[a.account.id]).await;

    let (status, body) = h
        .post(&format!("/v1/accounts/{}/models", a.account.id), &admin, json!({"name": "m2"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (_, body) = h.get(&format!("/v1/accounts/{}/models", a.account.id), &admin).await;
    assert_eq!(body["models"].as_array().unwrap().len(), 2);

    let other = h.store_key("acme", "second").await;
    let (status, body) = h
        .put(
            &format!("/v1/accounts/{}/default-keypair", a.account.id),
            &admin,
            json!({"keypairID": other.id}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["account"]["default_keypair_id"], other.id);
}

#[tokio::test]
async fn test_session_token_authenticates() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let key = h.user("alice", Role::Admin, &[a.account.id]).await;

    let (status, body) = h.call(Method::POST, "/v1/session", Some(key.as_str()), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let token = body["session"]["token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/accounts")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["accounts"][0]["authority_id"], "acme");
}

#[tokio::test]
async fn test_signing_log_scoped_to_accounts() {
    let h = Harness::new();
    let a = h.brand("acme").await;
    let b = h.brand("other").await;
    let key_a = h.user("fa", Role::Standard, &[a.account.id]).await;
    let key_b = h.user("fb", Role::Standard, &[b.account.id]).await;

    h.post("/v1/model", &key_a, json!({"brand-id": "acme", "model": "m1"})).await;
    h.post("/v1/model", &key_b, json!({"brand-id": "other", "model": "m1"})).await;
    let request_id = h.request_id(&key_a).await;
    h.post("/v1/serial", &key_a, serial_body("acme", "Z9", &request_id)).await;

    let (status, body) = h.get("/v1/signinglog", &key_a).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l["account_id"] == a.account.id));
    assert_eq!(logs[0]["serial"], "Z9");
    assert_eq!(logs[0]["nonce"], request_id.as_str());
}
