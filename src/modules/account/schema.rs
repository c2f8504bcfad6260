use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::modules::auth::model::LoginHistoryEntry;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFaceRequest {
    #[validate(length(min = 1, message = "Face image is required"))]
    pub face_image: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub otp: String,
}

// =============================================================================
// LOGIN HISTORY (security report)
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntryResponse>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntryResponse {
    pub login_time: chrono::DateTime<chrono::Utc>,
    pub success: bool,
    pub face_confidence: Option<f32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<LoginHistoryEntry> for HistoryEntryResponse {
    fn from(entry: LoginHistoryEntry) -> Self {
        Self {
            login_time: entry.login_time,
            success: entry.success,
            face_confidence: entry.face_confidence,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            failure_reason: entry.failure_reason,
        }
    }
}
