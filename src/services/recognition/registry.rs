use crate::config::DbPool;

use super::similarity;

/// One person, one account: checks a candidate signature against every
/// verified account's stored signature. Enforced at enrollment time only.
pub struct IdentityRegistry {
    pool: DbPool,
    threshold: f32,
}

impl IdentityRegistry {
    pub fn new(pool: DbPool, threshold: f32) -> Self {
        Self { pool, threshold }
    }

    /// Linear scan in ascending id order, short-circuiting on the first
    /// account judged to be the same person. Unverified accounts never
    /// count. Returns the conflicting account id so a future indexed
    /// backend can keep the same signature.
    pub async fn is_unique(&self, embedding: &[f32]) -> Result<(bool, Option<i64>), sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, embedding
            FROM users
            WHERE is_verified = TRUE AND embedding IS NOT NULL
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for (id, raw) in rows {
            let stored: Vec<f32> = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(user_id = id, "skipping unreadable stored embedding: {}", e);
                    continue;
                }
            };

            let (matched, score) =
                similarity::is_match(Some(embedding), Some(stored.as_slice()), self.threshold);
            if matched {
                tracing::debug!(user_id = id, similarity = score, "face already enrolled");
                return Ok((false, Some(id)));
            }
        }

        Ok((true, None))
    }
}
