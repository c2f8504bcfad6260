use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::common::{face_image, seed_verified_user, session_header, test_email, TestContext};

#[tokio::test]
#[serial]
async fn history_requires_login() {
    let ctx = TestContext::new().await;

    ctx.server
        .get("/account/history")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn history_lists_attempts_newest_first() {
    let ctx = TestContext::new().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;

    // One failed attempt with the wrong face...
    ctx.server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("mallory") }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // ...then a successful two-step login
    let session_id = ctx.login_session(&email, "alice").await;

    let (name, value) = session_header(&session_id);
    let response = ctx
        .server
        .get("/account/history")
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);

    // Newest first: the success from the completed login
    assert_eq!(entries[0]["success"], true);
    assert!(entries[0]["face_confidence"].as_f64().unwrap() > 0.99);

    assert_eq!(entries[1]["success"], false);
    assert!(entries[1]["failure_reason"]
        .as_str()
        .unwrap()
        .contains("does not match"));
    assert!(entries[1]["face_confidence"].is_number());

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn history_is_scoped_to_the_calling_account() {
    let ctx = TestContext::new().await;
    let alice_email = test_email();
    let bob_email = test_email();
    seed_verified_user(&ctx, "Alice", &alice_email, "alice").await;
    seed_verified_user(&ctx, "Bob", &bob_email, "bob").await;

    // Noise on Alice's account
    ctx.server
        .post("/auth/login")
        .json(&json!({ "email": &alice_email, "face_image": face_image("mallory") }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Bob logs in and reads his history
    let session_id = ctx.login_session(&bob_email, "bob").await;
    let (name, value) = session_header(&session_id);
    let response = ctx
        .server
        .get("/account/history")
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["success"], true);

    ctx.cleanup().await;
}
