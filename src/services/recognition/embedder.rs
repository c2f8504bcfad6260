use std::path::Path;
use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};

use super::detector::FaceBox;
use super::{Embedding, RecognitionError};

/// Canonical crop size fed to the embedding network.
const INPUT_SIZE: u32 = 160;

/// Pretrained identity-embedding network behind an ONNX session. Which model
/// is plugged in doesn't matter as long as the output dimensionality matches
/// every signature already stored.
pub struct FaceEmbedder {
    session: Session,
    _environment: Arc<Environment>,
    dimension: usize,
}

impl FaceEmbedder {
    pub fn new(model_path: &Path, dimension: usize) -> Result<Self, RecognitionError> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_embedder")
                .build()
                .map_err(|e| RecognitionError::Model(format!("Failed to create environment: {}", e)))?,
        );

        if !model_path.exists() {
            return Err(RecognitionError::Model(format!(
                "Embedding model not found at: {:?}",
                model_path
            )));
        }

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            dimension,
        })
    }

    pub fn embed(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding, RecognitionError> {
        let cropped = crop_face(image, face);
        let resized = cropped.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        let input_array = preprocess(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let embedding: Embedding = outputs[0]
            .try_extract::<f32>()?
            .view()
            .to_owned()
            .into_raw_vec();

        if embedding.len() != self.dimension {
            return Err(RecognitionError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }
}

fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    let width = (face.x2 - face.x1).max(1.0) as u32;
    let height = (face.y2 - face.y1).max(1.0) as u32;

    image.crop_imm(x, y, width, height)
}

// FaceNet-style whitening: (x - 127.5) / 128 on each RGB channel.
fn preprocess(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let size = INPUT_SIZE as usize;
    let mut array = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        array[[0, 0, y, x]] = (pixel[0] as f32 - 127.5) / 128.0;
        array[[0, 1, y, x]] = (pixel[1] as f32 - 127.5) / 128.0;
        array[[0, 2, y, x]] = (pixel[2] as f32 - 127.5) / 128.0;
    }

    array
}
