use chrono::{DateTime, Utc};

use crate::config::DbPool;

use super::model::{LoginHistoryEntry, User};

pub struct UserCrud {
    pool: DbPool,
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub embedding: &'a str,
    pub photo_path: Option<&'a str>,
    pub otp_hash: &'a str,
    pub otp_expires_at: DateTime<Utc>,
}

impl UserCrud {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts an unverified account and returns its id.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, embedding, photo_path, is_verified, otp_hash, otp_expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, FALSE, ?, ?, ?)
            "#,
        )
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.embedding)
        .bind(user.photo_path)
        .bind(user.otp_hash)
        .bind(user.otp_expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_verified_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? AND is_verified = TRUE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// Flips the account to verified and consumes its activation OTP
    /// material in the same statement.
    pub async fn activate(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET is_verified = TRUE, otp_hash = NULL, otp_expires_at = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_last_login(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn update_face(
        &self,
        id: i64,
        embedding: &str,
        photo_path: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET embedding = ?, photo_path = ? WHERE id = ?")
            .bind(embedding)
            .bind(photo_path)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Deletes the account row; login history cascades at the schema level.
    /// Returns the stored photo path so the caller can remove the on-disk
    /// artifact (the store does not manage files).
    pub async fn delete(&self, id: i64) -> Result<Option<String>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let photo_path: Option<Option<String>> =
            sqlx::query_scalar("SELECT photo_path FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(photo_path.flatten())
    }
}

// =============================================================================
// LOGIN HISTORY
// =============================================================================

pub struct LoginAttempt<'a> {
    pub user_id: i64,
    pub success: bool,
    pub face_confidence: Option<f32>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub failure_reason: Option<&'a str>,
}

pub struct LoginHistoryCrud {
    pool: DbPool,
}

impl LoginHistoryCrud {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Log-and-continue: a history row that cannot be written must never
    /// abort the authentication flow that produced it.
    pub async fn record(&self, attempt: &LoginAttempt<'_>) {
        if let Err(e) = self.insert(attempt).await {
            tracing::error!(
                user_id = attempt.user_id,
                "failed to record login attempt: {}",
                e
            );
        }
    }

    async fn insert(&self, attempt: &LoginAttempt<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO login_history (user_id, login_time, face_confidence, ip_address, user_agent, success, failure_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.user_id)
        .bind(Utc::now())
        .bind(attempt.face_confidence)
        .bind(attempt.ip_address.map(|s| clamp(s, 45)))
        .bind(attempt.user_agent.map(|s| clamp(s, 255)))
        .bind(attempt.success)
        .bind(attempt.failure_reason.map(|s| clamp(s, 255)))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<LoginHistoryEntry>, sqlx::Error> {
        sqlx::query_as::<_, LoginHistoryEntry>(
            "SELECT * FROM login_history WHERE user_id = ? ORDER BY login_time DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

fn clamp(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
