use std::path::PathBuf;

use uuid::Uuid;

/// On-disk storage for enrollment photos. The database row is the source of
/// truth for account existence; file removal here is always best-effort.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes the image under the upload directory and returns the stored
    /// path as a string for persistence. Callers are expected to have
    /// validated the bytes through the extraction pipeline already.
    pub async fn save(&self, image_bytes: &[u8], email: &str) -> Result<String, std::io::Error> {
        tokio::fs::create_dir_all(&self.root).await?;

        let filename = format!("{}_{}.jpg", sanitize(email), Uuid::new_v4().simple());
        let path = self.root.join(filename);
        tokio::fs::write(&path, image_bytes).await?;

        Ok(path.to_string_lossy().into_owned())
    }

    /// Best-effort removal: a missing or locked file is logged and ignored.
    pub async fn remove(&self, path: &str) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path, "failed to remove photo: {}", e),
        }
    }
}

fn sanitize(email: &str) -> String {
    email
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_flattens_address_punctuation() {
        assert_eq!(sanitize("alice@example.com"), "alice_example_com");
        assert_eq!(sanitize("weird+tag@x.co"), "weird_tag_x_co");
    }

    #[tokio::test]
    async fn save_then_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(dir.path());

        let path = store.save(b"fake image bytes", "a@b.com").await.unwrap();
        assert!(std::path::Path::new(&path).exists());
        assert!(path.ends_with(".jpg"));

        store.remove(&path).await;
        assert!(!std::path::Path::new(&path).exists());

        // removing again is a quiet no-op
        store.remove(&path).await;
    }
}
