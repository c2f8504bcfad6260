use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;
use std::sync::atomic::Ordering;

use crate::common::{face_image, no_face_image, seed_verified_user, test_email, test_password, TestContext};

fn register_body(email: &str, label: &str) -> serde_json::Value {
    json!({
        "name": "Test User",
        "email": email,
        "password": test_password(),
        "face_image": face_image(label)
    })
}

#[tokio::test]
#[serial]
async fn register_with_valid_data_returns_created() {
    let ctx = TestContext::new().await;
    let email = test_email();

    let response = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&email, "alice"))
        .await;

    response.assert_status(StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    assert!(body.get("user_id").is_some());

    // Provisional until the emailed code comes back
    let (is_verified, otp_hash): (bool, Option<String>) =
        sqlx::query_as("SELECT is_verified, otp_hash FROM users WHERE email = ?")
            .bind(&email)
            .fetch_one(&ctx.db)
            .await
            .unwrap();
    assert!(!is_verified);
    assert!(otp_hash.is_some());

    // The activation code went out by mail, and only by mail
    assert!(ctx.outbox.last_otp_for(&email).is_some());
    assert!(body.get("otp").is_none());

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_short_name_returns_bad_request() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "A",
            "email": test_email(),
            "password": test_password(),
            "face_image": face_image("alice")
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_weak_password_returns_bad_request() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": test_email(),
            "password": "weak",
            "face_image": face_image("alice")
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_invalid_email_returns_bad_request() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": "invalid-email",
            "password": test_password(),
            "face_image": face_image("alice")
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_missing_fields_returns_unprocessable() {
    let ctx = TestContext::new().await;

    // Missing face_image
    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": test_email(),
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_undetectable_face_returns_bad_request() {
    let ctx = TestContext::new().await;
    let email = test_email();

    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": &email,
            "password": test_password(),
            "face_image": no_face_image()
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("No face detected"));

    // Nothing was persisted
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(count.0, 0);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_verified_duplicate_email_returns_conflict() {
    let ctx = TestContext::new().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&email, "bob"))
        .await;

    response.assert_status(StatusCode::CONFLICT);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_with_enrolled_face_returns_conflict() {
    let ctx = TestContext::new().await;
    seed_verified_user(&ctx, "Alice", &test_email(), "alice").await;

    // Different email, same face
    let response = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&test_email(), "alice"))
        .await;

    response.assert_status(StatusCode::CONFLICT);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("Face already registered"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn unverified_account_does_not_reserve_its_face() {
    let ctx = TestContext::new().await;

    // First sign-up never activates
    ctx.server
        .post("/auth/register")
        .json(&register_body(&test_email(), "carol"))
        .await
        .assert_status(StatusCode::CREATED);

    // Same face under another email is still allowed to enroll
    let response = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&test_email(), "carol"))
        .await;

    response.assert_status(StatusCode::CREATED);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_replaces_stale_unverified_account() {
    let ctx = TestContext::new().await;
    let email = test_email();

    let first = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&email, "dave"))
        .await;
    first.assert_status(StatusCode::CREATED);
    let first_id = first.json::<serde_json::Value>()["user_id"].as_i64().unwrap();

    // Re-registering the same email tears the stale row down first
    let second = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&email, "dave"))
        .await;
    second.assert_status(StatusCode::CREATED);
    let second_id = second.json::<serde_json::Value>()["user_id"].as_i64().unwrap();

    assert_ne!(first_id, second_id);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(count.0, 1);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_email_failure_rolls_back_the_account() {
    let ctx = TestContext::new().await;
    let email = test_email();

    ctx.email_down.store(true, Ordering::SeqCst);

    let response = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&email, "erin"))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);

    // No orphaned provisional account survives a failed email
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(count.0, 0);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_normalizes_email_case() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let upper = email.to_uppercase();

    ctx.server
        .post("/auth/register")
        .json(&register_body(&upper, "frank"))
        .await
        .assert_status(StatusCode::CREATED);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(count.0, 1);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn register_response_includes_security_headers() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/register")
        .json(&register_body(&test_email(), "alice"))
        .await;

    assert!(response.headers().get("x-content-type-options").is_some());
    assert!(response.headers().get("x-frame-options").is_some());
    assert!(response.headers().get("cache-control").is_some());

    ctx.cleanup().await;
}
