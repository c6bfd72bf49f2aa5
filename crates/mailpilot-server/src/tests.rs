//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mailpilot_core::classify::MockClassifier;
use mailpilot_core::db::EmailInsertResult;
use mailpilot_core::models::{Category, Direction, NewEmail, NewSourceAccount, Protocol};

fn test_state() -> (Database, Router) {
    let db = Database::in_memory().unwrap();
    let vault = CredentialVault::new("test-passphrase").unwrap();
    let config = ServerConfig {
        require_auth: false,
        ..Default::default()
    };
    let app = create_router_with_classifier(
        db.clone(),
        vault,
        config,
        Some(ClassifierClient::Mock(MockClassifier::new())),
    );
    (db, app)
}

fn seed_account(db: &Database) -> i64 {
    db.create_account(&NewSourceAccount {
        user_id: "default".into(),
        address: "me@example.com".into(),
        protocol: Protocol::Imap,
        credentials: "encrypted-blob".into(),
    })
    .unwrap()
}

fn seed_email(db: &Database, account_id: i64, pid: &str, from: &str, subject: &str) -> i64 {
    match db
        .insert_email(&NewEmail {
            account_id,
            provider_message_id: pid.into(),
            direction: Direction::Inbound,
            from_name: None,
            from_address: from.into(),
            to_address: None,
            subject: Some(subject.into()),
            snippet: Some("snippet".into()),
            list_unsubscribe: None,
            precedence: None,
            received_at: None,
        })
        .unwrap()
    {
        EmailInsertResult::Inserted(id) => id,
        EmailInsertResult::Duplicate => panic!("expected insert"),
    }
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

// ========== Health ==========

#[tokio::test]
async fn test_health() {
    let (_db, app) = test_state();

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["classifier_configured"], true);
    assert_eq!(json["classifier_backend"], "mock");
}

// ========== Auth ==========

#[tokio::test]
async fn test_auth_required() {
    let db = Database::in_memory().unwrap();
    let vault = CredentialVault::new("test-passphrase").unwrap();
    let config = ServerConfig {
        require_auth: true,
        api_keys: vec!["secret-key".to_string()],
        ..Default::default()
    };
    let app = create_router_with_classifier(db, vault, config, None);

    let response = app
        .clone()
        .oneshot(get("/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("authorization", "Bearer secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ========== Accounts ==========

#[tokio::test]
async fn test_create_and_list_accounts() {
    let (db, app) = test_state();

    let body = serde_json::json!({
        "address": "Alice@Example.com",
        "protocol": "imap",
        "credentials": {
            "kind": "password",
            "username": "alice",
            "password": "hunter2",
            "host": "imap.example.com",
            "port": 993
        }
    });

    let response = app
        .clone()
        .oneshot(post_json("/api/accounts", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["address"], "alice@example.com");
    assert_eq!(json["protocol"], "imap");
    assert_eq!(json["active"], true);
    // Credential blob never leaves the server
    assert!(json.get("credentials").is_none());

    // Stored blob is encrypted, not the plaintext secret
    let account = db.get_account(json["id"].as_i64().unwrap()).unwrap();
    assert!(!account.credentials.contains("hunter2"));

    let response = app.oneshot(get("/api/accounts")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_account_rejects_unknown_protocol() {
    let (_db, app) = test_state();

    let body = serde_json::json!({
        "address": "a@b.example",
        "protocol": "pop3",
        "credentials": {
            "kind": "password",
            "username": "a", "password": "b",
            "host": "h", "port": 993
        }
    });

    let response = app.oneshot(post_json("/api/accounts", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_missing_account_is_404() {
    let (_db, app) = test_state();
    let response = app.oneshot(get("/api/accounts/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Emails ==========

#[tokio::test]
async fn test_list_and_get_emails() {
    let (db, app) = test_state();
    let account_id = seed_account(&db);
    let email_id = seed_email(&db, account_id, "m1", "a@x.example", "Hello");

    let response = app
        .clone()
        .oneshot(get(&format!("/api/emails?account_id={}", account_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get(&format!("/api/emails/{}", email_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["subject"], "Hello");
    assert_eq!(json["body_loaded"], false);
}

#[tokio::test]
async fn test_set_email_flag() {
    let (db, app) = test_state();
    let account_id = seed_account(&db);
    let email_id = seed_email(&db, account_id, "m1", "a@x.example", "Hello");

    let response = app
        .oneshot(post_json(
            &format!("/api/emails/{}/flags", email_id),
            serde_json::json!({"flag": "starred", "value": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(db.get_email(email_id).unwrap().starred);
}

// ========== Classification ==========

#[tokio::test]
async fn test_classify_email_endpoint() {
    let (db, app) = test_state();
    let account_id = seed_account(&db);
    let email_id = seed_email(&db, account_id, "m1", "billing@x.example", "Invoice #9");

    let response = app
        .oneshot(post_json(
            &format!("/api/emails/{}/classify", email_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["category"], "finance");
    assert_eq!(db.get_email(email_id).unwrap().category, Some(Category::Finance));
}

#[tokio::test]
async fn test_classify_batch_defaults_to_unclassified() {
    let (db, app) = test_state();
    let account_id = seed_account(&db);
    for i in 0..3 {
        seed_email(&db, account_id, &format!("m{}", i), "a@x.example", "Meeting notes");
    }

    let response = app
        .oneshot(post_json("/api/classify/batch", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["classified"], 3);
    assert!(db.unclassified_email_ids(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_classify_without_backend_is_unavailable() {
    let db = Database::in_memory().unwrap();
    let vault = CredentialVault::new("test-passphrase").unwrap();
    let config = ServerConfig {
        require_auth: false,
        ..Default::default()
    };
    let app = create_router_with_classifier(db.clone(), vault, config, None);

    let account_id = seed_account(&db);
    let email_id = seed_email(&db, account_id, "m1", "a@x.example", "Hello");

    let response = app
        .oneshot(post_json(
            &format!("/api/emails/{}/classify", email_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ========== Feedback and Reputation ==========

#[tokio::test]
async fn test_correction_flow() {
    let (db, app) = test_state();
    let account_id = seed_account(&db);
    let email_id = seed_email(&db, account_id, "m1", "junk@spam.example", "Hello");

    // Classify first so there is something to correct
    app.clone()
        .oneshot(post_json(
            &format!("/api/emails/{}/classify", email_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/emails/{}/feedback", email_id),
            serde_json::json!({"category": "spam"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["recorded"], true);
    assert_eq!(json["corrected"], "spam");

    // Sender reputation now carries the blacklist override
    let response = app
        .clone()
        .oneshot(get("/api/reputation?sender=junk@spam.example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["trust_override"], "untrusted");
    assert_eq!(json["trust_level"], "untrusted");

    // And the correction shows up in history and accuracy
    let response = app.clone().oneshot(get("/api/feedback")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let response = app.oneshot(get("/api/accuracy")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(!json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reputation_query_validation() {
    let (_db, app) = test_state();

    let response = app.clone().oneshot(get("/api/reputation")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/api/reputation?sender=nobody@x.example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reputation_override_and_rebuild() {
    let (_db, app) = test_state();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/reputation/override",
            serde_json::json!({"domain": "corp.example", "value": "trusted"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/api/reputation?domain=corp.example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["trust_override"], "trusted");

    let response = app
        .oneshot(post_json("/api/reputation/rebuild", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["processed"].as_u64().unwrap() >= 1);
}
