use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};

use crate::config::DbPool;
use crate::services::photos::PhotoStore;

/// Background reaper for provisional sign-ups that never activated. Uses the
/// same delete-and-cascade path as user-initiated deletion so photo cleanup
/// stays consistent.
pub struct StaleAccountSweeper {
    db: DbPool,
    photos: PhotoStore,
    window: ChronoDuration,
    check_interval: Duration,
}

impl StaleAccountSweeper {
    pub fn new(db: DbPool, photos: PhotoStore, window_minutes: i64, interval_secs: u64) -> Self {
        Self {
            db,
            photos,
            window: ChronoDuration::minutes(window_minutes),
            check_interval: Duration::from_secs(interval_secs),
        }
    }

    /// Main loop - runs continuously in background
    pub async fn run(&self) {
        tracing::info!(
            window_minutes = self.window.num_minutes(),
            "stale-account sweeper started"
        );
        let mut tick = interval(self.check_interval);

        loop {
            tick.tick().await;

            match self.sweep_once().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "swept stale unverified accounts"),
                Err(e) => tracing::error!("stale-account sweep failed: {}", e),
            }
        }
    }

    /// One pass over unverified accounts older than the window. The DELETE
    /// re-asserts the unverified state inside its own transaction so that an
    /// activation landing between the scan and the delete wins.
    pub async fn sweep_once(&self) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - self.window;

        let stale: Vec<(i64, Option<String>)> = sqlx::query_as(
            "SELECT id, photo_path FROM users WHERE is_verified = FALSE AND created_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        let mut removed = 0;
        for (id, photo_path) in stale {
            let mut tx = self.db.begin().await?;
            let result = sqlx::query(
                "DELETE FROM users WHERE id = ? AND is_verified = FALSE AND created_at < ?",
            )
            .bind(id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            // login_history rows cascade with the account row
            if result.rows_affected() > 0 {
                removed += 1;
                if let Some(path) = photo_path {
                    self.photos.remove(&path).await;
                }
                tracing::info!(user_id = id, "removed stale unverified account");
            }
        }

        Ok(removed)
    }
}
