use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use std::sync::Arc;
use validator::Validate;

use crate::services::email::templates;
use crate::services::otp::{self, ChallengeFlow, ChallengePayload, VerifyOutcome};
use crate::services::recognition::{self, registry::IdentityRegistry, similarity, Embedding};
use crate::services::session::{ClientMeta, SessionId};
use crate::services::hashing;
use crate::AppState;

use super::crud::{LoginAttempt, LoginHistoryCrud, NewUser, UserCrud};
use super::interface::AuthError;
use super::model::encode_embedding;
use super::schema::{
    ActivateRequest, LoginPendingResponse, LoginRequest, LoginResponse, MessageResponse,
    RegisterRequest, RegisterResponse, UserResponse, VerifyLoginOtpRequest,
};

/// Runs the CPU-bound extraction pipeline off the async runtime.
pub(crate) async fn extract_signature(
    state: &Arc<AppState>,
    image_bytes: Vec<u8>,
) -> Result<Option<Embedding>, AuthError> {
    let extractor = state.extractor.clone();
    tokio::task::spawn_blocking(move || extractor.extract(&image_bytes))
        .await
        .map_err(AuthError::internal)?
        .map_err(AuthError::from_recognition)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let users = UserCrud::new(state.db.clone());

    if let Some(existing) = users.find_by_email(&email).await? {
        if existing.is_verified {
            return Err(AuthError::EmailTaken);
        }
        // A stale provisional sign-up holds the email hostage until the
        // sweeper runs; tear it down here so re-registration works at once.
        tracing::info!(user_id = existing.id, "replacing stale unverified account");
        if let Some(path) = users.delete(existing.id).await? {
            state.photos.remove(&path).await;
        }
    }

    let image_bytes = recognition::decode_data_url(&req.face_image)
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let embedding = extract_signature(&state, image_bytes.clone())
        .await?
        .ok_or(AuthError::NoFaceDetected)?;

    let registry = IdentityRegistry::new(state.db.clone(), state.config.face_threshold);
    let (unique, conflict) = registry.is_unique(&embedding).await?;
    if !unique {
        tracing::info!(conflict_id = ?conflict, "registration rejected: face already enrolled");
        return Err(AuthError::FaceTaken);
    }

    let password_hash = hashing::hash_password(&req.password).map_err(AuthError::internal)?;

    let code = otp::generate_code();
    let otp_hash = hashing::hash_otp(&code).map_err(AuthError::internal)?;

    let photo_path = state
        .photos
        .save(&image_bytes, &email)
        .await
        .map_err(AuthError::internal)?;

    let user_id = users
        .create(&NewUser {
            name: &name,
            email: &email,
            password_hash: &password_hash,
            embedding: &encode_embedding(&embedding),
            photo_path: Some(&photo_path),
            otp_hash: &otp_hash,
            otp_expires_at: Utc::now() + Duration::minutes(state.config.otp_ttl_minutes),
        })
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.contains("Duplicate entry") || message.contains("1062") {
                AuthError::EmailTaken
            } else {
                AuthError::Database(e)
            }
        })?;

    let (subject, html, text) =
        templates::activation_otp(&name, &code, state.config.otp_ttl_minutes);
    if let Err(e) = state.email.send(&email, &subject, &html, &text).await {
        // No orphaned provisional accounts behind a failed email.
        tracing::warn!(user_id, "activation email failed, rolling back account: {}", e);
        if let Some(path) = users.delete(user_id).await? {
            state.photos.remove(&path).await;
        }
        return Err(AuthError::EmailDelivery(e.to_string()));
    }

    tracing::info!(user_id, "account registered, awaiting activation");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            message: "Account created! Check your email for the verification code.",
        }),
    ))
}

pub async fn activate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    if !otp::is_well_formed(&req.otp) {
        return Err(AuthError::Validation("OTP must be 6 digits".to_string()));
    }

    let users = UserCrud::new(state.db.clone());
    let user = users
        .find_by_id(req.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    if user.is_verified {
        return Err(AuthError::AlreadyVerified);
    }

    // Pre-activation OTP state lives on the account row, not in the
    // session-scoped challenge store.
    let otp_hash = user.otp_hash.as_deref().ok_or(AuthError::OtpExpired)?;
    if user.otp_expired() {
        return Err(AuthError::OtpExpired);
    }

    let matches = hashing::verify_otp(&req.otp, otp_hash).map_err(AuthError::internal)?;
    if !matches {
        return Err(AuthError::InvalidOtp);
    }

    users.activate(user.id).await?;
    tracing::info!(user_id = user.id, "account activated");

    Ok(Json(MessageResponse::new("Account activated successfully")))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionId,
    meta: ClientMeta,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginPendingResponse>, AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let email = req.email.trim().to_lowercase();
    let users = UserCrud::new(state.db.clone());
    let history = LoginHistoryCrud::new(state.db.clone());

    let user = users
        .find_verified_by_email(&email)
        .await?
        .ok_or(AuthError::NoVerifiedAccount)?;

    let image_bytes = recognition::decode_data_url(&req.face_image)
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let Some(probe) = extract_signature(&state, image_bytes).await? else {
        history
            .record(&LoginAttempt {
                user_id: user.id,
                success: false,
                face_confidence: None,
                ip_address: meta.ip.as_deref(),
                user_agent: meta.user_agent.as_deref(),
                failure_reason: Some("No face detected in image"),
            })
            .await;
        return Err(AuthError::NoFaceDetected);
    };

    let stored = user.embedding_vec();
    if stored.is_none() {
        history
            .record(&LoginAttempt {
                user_id: user.id,
                success: false,
                face_confidence: None,
                ip_address: meta.ip.as_deref(),
                user_agent: meta.user_agent.as_deref(),
                failure_reason: Some("No face data found for account"),
            })
            .await;
        return Err(AuthError::NoEnrolledFace);
    }

    let (matched, similarity) = similarity::is_match(
        Some(probe.as_slice()),
        stored.as_deref(),
        state.config.face_threshold,
    );

    if !matched {
        let reason = format!("Face does not match. Similarity: {:.2}", similarity);
        history
            .record(&LoginAttempt {
                user_id: user.id,
                success: false,
                face_confidence: Some(similarity),
                ip_address: meta.ip.as_deref(),
                user_agent: meta.user_agent.as_deref(),
                failure_reason: Some(&reason),
            })
            .await;
        return Err(AuthError::FaceMismatch { similarity });
    }

    // Face verified; the session becomes authenticated only after the
    // emailed code comes back.
    let code = state
        .challenges
        .start(
            &session.0,
            ChallengeFlow::Login,
            ChallengePayload::Login {
                user_id: user.id,
                similarity,
            },
        )
        .map_err(AuthError::internal)?;

    let (subject, html, text) =
        templates::login_otp(&user.name, &code, state.config.otp_ttl_minutes);
    if let Err(e) = state.email.send(&user.email, &subject, &html, &text).await {
        state.challenges.cancel(&session.0, ChallengeFlow::Login);
        return Err(AuthError::EmailDelivery(e.to_string()));
    }

    tracing::info!(user_id = user.id, similarity, "face verified, login code sent");

    Ok(Json(LoginPendingResponse {
        otp_required: true,
        session_id: session.0,
        message: "Face verified. Check your email for the login code.",
    }))
}

pub async fn verify_login_otp(
    State(state): State<Arc<AppState>>,
    session: SessionId,
    meta: ClientMeta,
    Json(req): Json<VerifyLoginOtpRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    if !otp::is_well_formed(&req.otp) {
        return Err(AuthError::Validation("OTP must be 6 digits".to_string()));
    }

    let (user_id, similarity) =
        match state.challenges.verify(&session.0, ChallengeFlow::Login, &req.otp) {
            VerifyOutcome::Ok(ChallengePayload::Login { user_id, similarity }) => {
                (user_id, similarity)
            }
            VerifyOutcome::Ok(_) => {
                return Err(AuthError::Internal("login challenge payload mismatch".into()))
            }
            VerifyOutcome::Expired => return Err(AuthError::OtpExpired),
            VerifyOutcome::Invalid => return Err(AuthError::InvalidOtp),
            VerifyOutcome::NoActiveChallenge => return Err(AuthError::NoActiveChallenge),
        };

    let users = UserCrud::new(state.db.clone());
    let history = LoginHistoryCrud::new(state.db.clone());

    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    let previous_login = user.last_login_at;

    state.sessions.authenticate(&session.0, user.id);

    // Success is recorded at finalization, not at the face match.
    history
        .record(&LoginAttempt {
            user_id: user.id,
            success: true,
            face_confidence: Some(similarity),
            ip_address: meta.ip.as_deref(),
            user_agent: meta.user_agent.as_deref(),
            failure_reason: None,
        })
        .await;
    users.update_last_login(user.id).await?;

    let (subject, html, text) = templates::login_alert(&user.name, previous_login, similarity);
    if let Err(e) = state.email.send(&user.email, &subject, &html, &text).await {
        tracing::warn!(user_id = user.id, "login alert email failed: {}", e);
    }

    tracing::info!(user_id = user.id, "login complete");

    Ok(Json(LoginResponse {
        user: UserResponse::from(&user),
        similarity,
        message: "Login successful!",
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: SessionId,
) -> Json<MessageResponse> {
    state.sessions.clear(&session.0);
    Json(MessageResponse::new("You have been logged out successfully"))
}
