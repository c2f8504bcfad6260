use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use crate::modules::auth::controller::extract_signature;
use crate::modules::auth::crud::{LoginHistoryCrud, UserCrud};
use crate::modules::auth::interface::AuthError;
use crate::modules::auth::model::{encode_embedding, User};
use crate::modules::auth::schema::{MessageResponse, UserResponse};
use crate::services::email::templates;
use crate::services::otp::{self, ChallengeFlow, ChallengePayload, VerifyOutcome};
use crate::services::recognition;
use crate::services::session::CurrentUser;
use crate::AppState;

use super::schema::{ConfirmRequest, HistoryResponse, UpdateFaceRequest};

const HISTORY_LIMIT: i64 = 50;

/// Loads the caller's account row; a session pointing at a deleted or
/// deactivated account is torn down rather than served.
async fn load_account(state: &Arc<AppState>, current: &CurrentUser) -> Result<User, AuthError> {
    let users = UserCrud::new(state.db.clone());
    match users.find_by_id(current.user_id).await? {
        Some(user) if user.is_verified => Ok(user),
        _ => {
            state.sessions.clear(&current.session_id);
            Err(AuthError::Unauthenticated)
        }
    }
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<UserResponse>, AuthError> {
    let user = load_account(&state, &current).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<HistoryResponse>, AuthError> {
    let user = load_account(&state, &current).await?;

    let entries = LoginHistoryCrud::new(state.db.clone())
        .list_for_user(user.id, HISTORY_LIMIT)
        .await?;

    Ok(Json(HistoryResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// FACE UPDATE (request -> emailed OTP -> confirm)
// =============================================================================

pub async fn update_face_request(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<UpdateFaceRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let user = load_account(&state, &current).await?;

    let image_bytes = recognition::decode_data_url(&req.face_image)
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    // Reject undetectable images up front; the pending bytes are only worth
    // an OTP round-trip if they will enroll.
    extract_signature(&state, image_bytes.clone())
        .await?
        .ok_or(AuthError::NoFaceDetected)?;

    let code = state
        .challenges
        .start(
            &current.session_id,
            ChallengeFlow::FaceUpdate,
            ChallengePayload::FaceUpdate {
                user_id: user.id,
                image: image_bytes,
            },
        )
        .map_err(AuthError::internal)?;

    let (subject, html, text) =
        templates::face_update_otp(&user.name, &code, state.config.otp_ttl_minutes);
    if let Err(e) = state.email.send(&user.email, &subject, &html, &text).await {
        state
            .challenges
            .cancel(&current.session_id, ChallengeFlow::FaceUpdate);
        return Err(AuthError::EmailDelivery(e.to_string()));
    }

    Ok(Json(MessageResponse::new(
        "Verification code sent successfully",
    )))
}

pub async fn update_face_confirm(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    if !otp::is_well_formed(&req.otp) {
        return Err(AuthError::Validation("OTP must be 6 digits".to_string()));
    }

    let user = load_account(&state, &current).await?;

    let image = match state
        .challenges
        .verify(&current.session_id, ChallengeFlow::FaceUpdate, &req.otp)
    {
        VerifyOutcome::Ok(ChallengePayload::FaceUpdate { user_id, image })
            if user_id == user.id =>
        {
            image
        }
        VerifyOutcome::Ok(_) => return Err(AuthError::NoActiveChallenge),
        VerifyOutcome::Expired => return Err(AuthError::OtpExpired),
        VerifyOutcome::Invalid => return Err(AuthError::InvalidOtp),
        VerifyOutcome::NoActiveChallenge => return Err(AuthError::NoActiveChallenge),
    };

    let embedding = extract_signature(&state, image.clone())
        .await?
        .ok_or(AuthError::NoFaceDetected)?;

    let photo_path = state
        .photos
        .save(&image, &user.email)
        .await
        .map_err(AuthError::internal)?;

    UserCrud::new(state.db.clone())
        .update_face(user.id, &encode_embedding(&embedding), &photo_path)
        .await?;

    if let Some(old_path) = &user.photo_path {
        state.photos.remove(old_path).await;
    }

    tracing::info!(user_id = user.id, "face data replaced");

    Ok(Json(MessageResponse::new("Face data updated successfully")))
}

// =============================================================================
// ACCOUNT DELETION (request -> emailed OTP -> confirm)
// =============================================================================

pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<MessageResponse>, AuthError> {
    let user = load_account(&state, &current).await?;

    let code = state
        .challenges
        .start(
            &current.session_id,
            ChallengeFlow::AccountDeletion,
            ChallengePayload::AccountDeletion { user_id: user.id },
        )
        .map_err(AuthError::internal)?;

    let (subject, html, text) =
        templates::deletion_otp(&user.name, &code, state.config.otp_ttl_minutes);
    if let Err(e) = state.email.send(&user.email, &subject, &html, &text).await {
        state
            .challenges
            .cancel(&current.session_id, ChallengeFlow::AccountDeletion);
        return Err(AuthError::EmailDelivery(e.to_string()));
    }

    Ok(Json(MessageResponse::new("Deletion code sent successfully")))
}

pub async fn delete_confirm(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    if !otp::is_well_formed(&req.otp) {
        return Err(AuthError::Validation("OTP must be 6 digits".to_string()));
    }

    let user = load_account(&state, &current).await?;

    match state
        .challenges
        .verify(&current.session_id, ChallengeFlow::AccountDeletion, &req.otp)
    {
        VerifyOutcome::Ok(ChallengePayload::AccountDeletion { user_id })
            if user_id == user.id => {}
        VerifyOutcome::Ok(_) => return Err(AuthError::NoActiveChallenge),
        VerifyOutcome::Expired => return Err(AuthError::OtpExpired),
        VerifyOutcome::Invalid => return Err(AuthError::InvalidOtp),
        VerifyOutcome::NoActiveChallenge => return Err(AuthError::NoActiveChallenge),
    }

    // Row first (history cascades with it), then the photo, then the
    // best-effort farewell mail.
    if let Some(path) = UserCrud::new(state.db.clone()).delete(user.id).await? {
        state.photos.remove(&path).await;
    }

    state.sessions.clear(&current.session_id);

    let (subject, html, text) = templates::account_deleted(&user.name);
    if let Err(e) = state.email.send(&user.email, &subject, &html, &text).await {
        tracing::warn!(user_id = user.id, "deletion confirmation email failed: {}", e);
    }

    tracing::info!(user_id = user.id, "account deleted");

    Ok(Json(MessageResponse::new("Account deleted successfully")))
}
