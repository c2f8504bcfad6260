pub mod detector;
pub mod embedder;
pub mod extractor;
pub mod registry;
pub mod similarity;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Fixed-length face signature. Dimensionality is set by the embedding model
/// and must match across every stored signature.
pub type Embedding = Vec<f32>;

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Invalid image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Embedding dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RecognitionError {
    /// Decode-class failures are the caller's fault (bad upload); everything
    /// else is ours.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Base64(_) | Self::Image(_))
    }
}

/// Turns raw image bytes into a face signature.
///
/// `Ok(None)` means no face was found in the image; it is a first-class
/// outcome, not an error. Implementations must be pure given their loaded
/// model weights.
pub trait SignatureExtractor: Send + Sync {
    fn extract(&self, image_bytes: &[u8]) -> Result<Option<Embedding>, RecognitionError>;
}

/// Accepts both a bare base64 string and a browser-style
/// `data:image/...;base64,` URL, as captured by a webcam frontend.
pub fn decode_data_url(payload: &str) -> Result<Vec<u8>, RecognitionError> {
    let encoded = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:image") => rest,
        _ => payload,
    };
    Ok(STANDARD.decode(encoded.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_data_url_prefix() {
        let raw = STANDARD.encode(b"jpegbytes");
        let with_prefix = format!("data:image/jpeg;base64,{}", raw);
        assert_eq!(decode_data_url(&with_prefix).unwrap(), b"jpegbytes");
        assert_eq!(decode_data_url(&raw).unwrap(), b"jpegbytes");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_data_url("not base64 at all!!!").is_err());
    }
}
