use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    /// Face signature stored as a JSON array of f32; absent until enrollment
    /// produced one.
    pub embedding: Option<String>,
    pub photo_path: Option<String>,
    pub is_verified: bool,
    /// Activation OTP material; present only between registration and the
    /// activation that consumes it.
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn embedding_vec(&self) -> Option<Vec<f32>> {
        self.embedding
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn otp_expired(&self) -> bool {
        match self.otp_expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => true,
        }
    }
}

pub fn encode_embedding(embedding: &[f32]) -> String {
    serde_json::to_string(embedding).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone, FromRow)]
pub struct LoginHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub login_time: DateTime<Utc>,
    pub face_confidence: Option<f32>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}
