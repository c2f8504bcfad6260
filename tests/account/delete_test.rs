use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::common::{
    face_image, seed_verified_user, session_header, test_email, test_password, TestContext,
};

fn wrong_code(otp: &str) -> String {
    if otp == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

async fn user_count(ctx: &TestContext, email: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    count
}

async fn history_count(ctx: &TestContext, user_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM login_history WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    count
}

#[tokio::test]
#[serial]
async fn delete_requires_login() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/account/delete/request")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn delete_confirm_removes_account_history_and_session() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.login_session(&email, "alice").await;

    // The login above wrote history that must cascade away
    assert!(history_count(&ctx, user_id).await > 0);

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/request")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::OK);

    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(user_count(&ctx, &email).await, 0);
    assert_eq!(history_count(&ctx, user_id).await, 0);

    // Session is gone
    let (name, value) = session_header(&session_id);
    ctx.server
        .get("/account/me")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Farewell notification went out after the row was removed
    assert!(ctx
        .outbox
        .last_subject_for(&email)
        .unwrap()
        .contains("Account Deleted"));

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn delete_confirm_with_wrong_code_keeps_the_account() {
    let ctx = TestContext::new().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.login_session(&email, "alice").await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/request")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::OK);

    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": wrong_code(&otp) }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    assert_eq!(user_count(&ctx, &email).await, 1);

    // Challenge survived the bad attempt
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(user_count(&ctx, &email).await, 0);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn deleted_email_and_face_can_register_again() {
    let ctx = TestContext::new().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.login_session(&email, "alice").await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/request")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::OK);
    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    // Same email AND same face enroll cleanly after deletion
    ctx.server
        .post("/auth/register")
        .json(&json!({
            "name": "Alice",
            "email": &email,
            "password": test_password(),
            "face_image": face_image("alice")
        }))
        .await
        .assert_status(StatusCode::CREATED);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn delete_confirm_after_expiry_keeps_the_account() {
    let ctx = TestContext::with_expired_otps().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.force_session(user_id);

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/request")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::OK);

    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/delete/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    assert_eq!(user_count(&ctx, &email).await, 1);

    ctx.cleanup().await;
}
