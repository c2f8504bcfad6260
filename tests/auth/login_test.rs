use axum::http::{HeaderName, HeaderValue, StatusCode};
use serde_json::json;
use serial_test::serial;

use crate::common::{
    face_image, no_face_image, seed_verified_user, session_header, test_email, TestContext,
};

fn wrong_code(otp: &str) -> String {
    if otp == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

async fn success_rows(ctx: &TestContext, user_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM login_history WHERE user_id = ? AND success = TRUE",
    )
    .bind(user_id)
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    count
}

#[tokio::test]
#[serial]
async fn login_with_matching_face_requires_otp() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("alice") }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert_eq!(body["otp_required"], true);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    // A login code went out, but the session is not authenticated yet and
    // no success has been recorded
    assert!(ctx.outbox.last_otp_for(&email).is_some());
    assert_eq!(success_rows(&ctx, user_id).await, 0);

    let (name, value) = session_header(&session_id);
    ctx.server
        .get("/account/me")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn login_with_non_matching_face_is_rejected_and_recorded() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("mallory") }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("Similarity"));

    // Failed attempt lands in history with the similarity score attached
    let row: (bool, Option<f32>, Option<String>) = sqlx::query_as(
        "SELECT success, face_confidence, failure_reason FROM login_history WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    assert!(!row.0);
    assert!(row.1.is_some());
    assert!(row.2.unwrap().contains("does not match"));

    // No login code was sent for a failed match
    assert!(ctx.outbox.last_otp_for(&email).is_none());

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn login_with_undetectable_face_is_rejected_and_recorded() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": no_face_image() }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    let row: (bool, Option<f32>, Option<String>) = sqlx::query_as(
        "SELECT success, face_confidence, failure_reason FROM login_history WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    assert!(!row.0);
    assert!(row.1.is_none());
    assert!(row.2.unwrap().contains("No face detected"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn login_with_unknown_email_returns_not_found() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": test_email(), "face_image": face_image("alice") }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn login_with_unverified_account_returns_not_found() {
    let ctx = TestContext::new().await;
    let email = test_email();

    // Registered but never activated
    ctx.server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": &email,
            "password": crate::common::test_password(),
            "face_image": face_image("bob")
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("bob") }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn verify_login_otp_authenticates_the_session() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let session_id = ctx.login_session(&email, "alice").await;

    // Session now reaches authenticated endpoints
    let (name, value) = session_header(&session_id);
    let me = ctx.server.get("/account/me").add_header(name, value).await;
    me.assert_status(StatusCode::OK);
    assert_eq!(me.json::<serde_json::Value>()["email"], email);

    // Success recorded at finalization, last login stamped, alert mailed
    assert_eq!(success_rows(&ctx, user_id).await, 1);

    let (last_login,): (Option<chrono::DateTime<chrono::Utc>>,) =
        sqlx::query_as("SELECT last_login_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&ctx.db)
            .await
            .unwrap();
    assert!(last_login.is_some());

    assert!(ctx
        .outbox
        .last_subject_for(&email)
        .unwrap()
        .contains("Login Alert"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn verify_login_otp_with_wrong_code_is_retryable() {
    let ctx = TestContext::new().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("alice") }))
        .await;
    response.assert_status(StatusCode::OK);
    let session_id = response.json::<serde_json::Value>()["session_id"]
        .as_str()
        .unwrap()
        .to_string();
    let otp = ctx.outbox.last_otp_for(&email).unwrap();

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/auth/login/verify")
        .add_header(name, value)
        .json(&json!({ "otp": wrong_code(&otp) }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Challenge stayed pending; the right code still completes the login
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/auth/login/verify")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn verify_login_otp_without_challenge_returns_bad_request() {
    let ctx = TestContext::new().await;

    let (name, value) = session_header("a-session-nobody-started");
    let response = ctx
        .server
        .post("/auth/login/verify")
        .add_header(name, value)
        .json(&json!({ "otp": "123456" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn verify_login_otp_after_expiry_clears_the_challenge() {
    let ctx = TestContext::with_expired_otps().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("alice") }))
        .await;
    response.assert_status(StatusCode::OK);
    let session_id = response.json::<serde_json::Value>()["session_id"]
        .as_str()
        .unwrap()
        .to_string();
    let otp = ctx.outbox.last_otp_for(&email).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // Correct code, too late
    let (name, value) = session_header(&session_id);
    let first = ctx
        .server
        .post("/auth/login/verify")
        .add_header(name, value)
        .json(&json!({ "otp": &otp }))
        .await;
    first.assert_status(StatusCode::UNAUTHORIZED);
    assert!(first.json::<serde_json::Value>()["error"]
        .as_str()
        .unwrap()
        .contains("expired"));

    // Pending state was cleared: the same attempt now has no challenge
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/auth/login/verify")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn failed_login_records_client_metadata() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;

    ctx.server
        .post("/auth/login")
        .add_header(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        )
        .add_header(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_static("integration-suite/1.0"),
        )
        .json(&json!({ "email": &email, "face_image": face_image("mallory") }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let (ip, agent): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT ip_address, user_agent FROM login_history WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&ctx.db)
            .await
            .unwrap();
    assert_eq!(ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(agent.as_deref(), Some("integration-suite/1.0"));

    ctx.cleanup().await;
}
