use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::common::{face_image, session_header, test_email, test_password, TestContext};

/// The whole journey: sign up with a face, activate by emailed code, then
/// sign in with the same face and finish with the login code.
#[tokio::test]
#[serial]
async fn full_signup_and_login_journey() {
    let ctx = TestContext::new().await;
    let email = test_email();

    // Register
    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Alice",
            "email": &email,
            "password": test_password(),
            "face_image": face_image("alice")
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let user_id = response.json::<serde_json::Value>()["user_id"]
        .as_i64()
        .unwrap();

    // Activate with the emailed code
    let activation_otp = ctx.outbox.last_otp_for(&email).unwrap();
    ctx.server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": activation_otp }))
        .await
        .assert_status(StatusCode::OK);

    // Two-step login with the enrolled face
    let login = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "email": &email, "face_image": face_image("alice") }))
        .await;
    login.assert_status(StatusCode::OK);
    let session_id = login.json::<serde_json::Value>()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let login_otp = ctx.outbox.last_otp_for(&email).unwrap();
    let (name, value) = session_header(&session_id);
    let verified = ctx
        .server
        .post("/auth/login/verify")
        .add_header(name, value)
        .json(&json!({ "otp": login_otp }))
        .await;
    verified.assert_status(StatusCode::OK);

    let body: serde_json::Value = verified.json();
    assert_eq!(body["user"]["email"], email);
    // Identical signature scores 1.0 at the stub extractor
    assert!(body["similarity"].as_f64().unwrap() > 0.99);

    // Exactly one successful history row for the whole journey
    let (successes,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM login_history WHERE user_id = ? AND success = TRUE",
    )
    .bind(user_id)
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    assert_eq!(successes, 1);

    // Three mails total: activation code, login code, login alert
    assert_eq!(ctx.outbox.count_for(&email), 3);

    // And the session is live
    let (name, value) = session_header(&session_id);
    ctx.server
        .get("/account/me")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::OK);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn logout_drops_the_session() {
    let ctx = TestContext::new().await;
    let email = test_email();
    crate::common::seed_verified_user(&ctx, "Alice", &email, "alice").await;

    let session_id = ctx.login_session(&email, "alice").await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/auth/logout")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::OK);

    let (name, value) = session_header(&session_id);
    ctx.server
        .get("/account/me")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.cleanup().await;
}
