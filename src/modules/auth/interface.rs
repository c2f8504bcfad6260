use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::recognition::RecognitionError;

use super::schema::ErrorResponse;

// =============================================================================
// ERROR TYPES
// =============================================================================

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("No face detected in image. Please try again.")]
    NoFaceDetected,

    #[error("User not found")]
    UserNotFound,

    #[error("No verified account found with this email")]
    NoVerifiedAccount,

    #[error("No face data found for this account")]
    NoEnrolledFace,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Face already registered. Each person can only have one account.")]
    FaceTaken,

    #[error("Face does not match. Similarity: {similarity:.2}")]
    FaceMismatch { similarity: f32 },

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("OTP has expired. Please try again.")]
    OtpExpired,

    #[error("No pending confirmation for this session. Please restart.")]
    NoActiveChallenge,

    #[error("Account already activated")]
    AlreadyVerified,

    #[error("Please log in first")]
    Unauthenticated,

    #[error("Failed to send email: {0}")]
    EmailDelivery(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NoFaceDetected => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::NoVerifiedAccount => StatusCode::NOT_FOUND,
            Self::NoEnrolledFace => StatusCode::NOT_FOUND,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::FaceTaken => StatusCode::CONFLICT,
            Self::FaceMismatch { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidOtp => StatusCode::UNAUTHORIZED,
            Self::OtpExpired => StatusCode::UNAUTHORIZED,
            Self::NoActiveChallenge => StatusCode::BAD_REQUEST,
            Self::AlreadyVerified => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Extraction failures split into "your upload was unreadable" and
    /// "our model broke"; the latter never leaks details to the client.
    pub fn from_recognition(e: RecognitionError) -> Self {
        if e.is_user_error() {
            Self::Validation(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Database(e) => {
                tracing::error!("database error: {}", e);
                "Internal server error".to_string()
            }
            Self::Internal(e) => {
                tracing::error!("internal error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
