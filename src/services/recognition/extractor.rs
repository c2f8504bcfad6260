use std::path::Path;

use super::detector::FaceDetector;
use super::embedder::FaceEmbedder;
use super::{Embedding, RecognitionError, SignatureExtractor};

const DETECTION_CONFIDENCE: f32 = 0.5;

/// Production extractor: ONNX detector picks the best face, ONNX embedder
/// turns the crop into a signature.
pub struct OnnxExtractor {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxExtractor {
    pub fn new(
        detector_model: &Path,
        embedder_model: &Path,
        embedding_dim: usize,
    ) -> Result<Self, RecognitionError> {
        Ok(Self {
            detector: FaceDetector::new(detector_model, DETECTION_CONFIDENCE)?,
            embedder: FaceEmbedder::new(embedder_model, embedding_dim)?,
        })
    }
}

impl SignatureExtractor for OnnxExtractor {
    fn extract(&self, image_bytes: &[u8]) -> Result<Option<Embedding>, RecognitionError> {
        let image = image::load_from_memory(image_bytes)?;

        let faces = self.detector.detect(&image)?;
        // detect() returns boxes best-first; everything past the first is a
        // weaker detection in the same frame
        let Some(best) = faces.first() else {
            return Ok(None);
        };

        let embedding = self.embedder.embed(&image, best)?;
        Ok(Some(embedding))
    }
}
