use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::common::{
    face_image, no_face_image, seed_verified_user, session_header, stub_embedding, test_email,
    TestContext,
};
use face_auth::modules::auth::model::encode_embedding;

fn wrong_code(otp: &str) -> String {
    if otp == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

async fn stored_embedding(ctx: &TestContext, user_id: i64) -> String {
    let (embedding,): (String,) = sqlx::query_as("SELECT embedding FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    embedding
}

#[tokio::test]
#[serial]
async fn update_face_requires_login() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/account/face/request")
        .json(&json!({ "face_image": face_image("newface") }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_face_request_rejects_undetectable_image() {
    let ctx = TestContext::new().await;
    let email = test_email();
    seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.login_session(&email, "alice").await;

    let (name, value) = session_header(&session_id);
    let response = ctx
        .server
        .post("/account/face/request")
        .add_header(name, value)
        .json(&json!({ "face_image": no_face_image() }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    // No challenge was opened for the bad image
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": "123456" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_face_confirm_replaces_the_stored_signature() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.login_session(&email, "alice").await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/request")
        .add_header(name, value)
        .json(&json!({ "face_image": face_image("newface") }))
        .await
        .assert_status(StatusCode::OK);

    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(
        stored_embedding(&ctx, user_id).await,
        encode_embedding(&stub_embedding("newface"))
    );

    let (photo_path,): (Option<String>,) =
        sqlx::query_as("SELECT photo_path FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&ctx.db)
            .await
            .unwrap();
    assert!(photo_path.is_some());

    // Logging in with the new face now works
    ctx.login_session(&email, "newface").await;

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_face_confirm_with_wrong_code_changes_nothing() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.login_session(&email, "alice").await;
    let original = stored_embedding(&ctx, user_id).await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/request")
        .add_header(name, value)
        .json(&json!({ "face_image": face_image("newface") }))
        .await
        .assert_status(StatusCode::OK);

    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": wrong_code(&otp) }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    assert_eq!(stored_embedding(&ctx, user_id).await, original);

    // Still pending: the right code applies the update afterwards
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await
        .assert_status(StatusCode::OK);

    assert_ne!(stored_embedding(&ctx, user_id).await, original);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_face_confirm_after_expiry_leaves_signature_unchanged() {
    let ctx = TestContext::with_expired_otps().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.force_session(user_id);
    let original = stored_embedding(&ctx, user_id).await;

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/request")
        .add_header(name, value)
        .json(&json!({ "face_image": face_image("newface") }))
        .await
        .assert_status(StatusCode::OK);

    let otp = ctx.outbox.last_otp_for(&email).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let (name, value) = session_header(&session_id);
    let response = ctx
        .server
        .post("/account/face/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": otp }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(response.json::<serde_json::Value>()["error"]
        .as_str()
        .unwrap()
        .contains("expired"));

    assert_eq!(stored_embedding(&ctx, user_id).await, original);

    ctx.cleanup().await;
}

#[tokio::test]
#[serial]
async fn update_face_request_email_failure_cancels_the_challenge() {
    let ctx = TestContext::new().await;
    let email = test_email();
    let user_id = seed_verified_user(&ctx, "Alice", &email, "alice").await;
    let session_id = ctx.force_session(user_id);

    ctx.email_down.store(true, std::sync::atomic::Ordering::SeqCst);

    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/request")
        .add_header(name, value)
        .json(&json!({ "face_image": face_image("newface") }))
        .await
        .assert_status(StatusCode::BAD_GATEWAY);

    ctx.email_down.store(false, std::sync::atomic::Ordering::SeqCst);

    // Nothing pending after the failed request
    let (name, value) = session_header(&session_id);
    ctx.server
        .post("/account/face/confirm")
        .add_header(name, value)
        .json(&json!({ "otp": "123456" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup().await;
}
