use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::common::{face_image, test_email, test_password, TestContext};

/// Registers an account and returns (user_id, activation otp).
async fn register(ctx: &TestContext, email: &str, label: &str) -> (i64, String) {
    let response = ctx
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": email,
            "password": test_password(),
            "face_image": face_image(label)
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let user_id = response.json::<serde_json::Value>()["user_id"]
        .as_i64()
        .unwrap();
    let otp = ctx.outbox.last_otp_for(email).expect("activation email");

    (user_id, otp)
}

fn wrong_code(otp: &str) -> String {
    if otp == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

#[tokio::test]
#[serial]
async fn activate_with_correct_otp_marks_account_verified() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (user_id, otp) = register(&ctx, &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": otp }))
        .await;

    response.assert_status(StatusCode::OK);

    // Verified, and the consumed OTP material is gone from the row
    let (is_verified, otp_hash): (bool, Option<String>) =
        sqlx::query_as("SELECT is_verified, otp_hash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&ctx.db)
            .await
            .unwrap();
    assert!(is_verified);
    assert!(otp_hash.is_none());

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn activate_with_wrong_otp_is_retryable() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (user_id, otp) = register(&ctx, &email, "alice").await;

    let response = ctx
        .server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": wrong_code(&otp) }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let (is_verified,): (bool,) = sqlx::query_as("SELECT is_verified FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert!(!is_verified);

    // The real code still works afterwards
    ctx.server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn activate_twice_returns_bad_request() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (user_id, otp) = register(&ctx, &email, "alice").await;

    ctx.server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": &otp }))
        .await
        .assert_status(StatusCode::OK);

    let response = ctx
        .server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": otp }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn activate_unknown_user_returns_not_found() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/activate")
        .json(&json!({ "user_id": 999999, "otp": "123456" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn activate_with_malformed_otp_returns_bad_request() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let (user_id, _) = register(&ctx, &email, "alice").await;

    for bad in ["12345", "1234567", "12a456", ""] {
        let response = ctx
            .server
            .post("/auth/activate")
            .json(&json!({ "user_id": user_id, "otp": bad }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn activate_with_expired_otp_is_rejected_even_when_correct() {
    let ctx = TestContext::with_expired_otps().await;
    let email = test_email();
    let (user_id, otp) = register(&ctx, &email, "alice").await;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let response = ctx
        .server
        .post("/auth/activate")
        .json(&json!({ "user_id": user_id, "otp": otp }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("expired"));

    let (is_verified,): (bool,) = sqlx::query_as("SELECT is_verified FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert!(!is_verified);

    ctx.cleanup().await;
}
