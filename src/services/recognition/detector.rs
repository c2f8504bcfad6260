use std::path::Path;
use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};

use super::RecognitionError;

const INPUT_WIDTH: u32 = 640;
const INPUT_HEIGHT: u32 = 640;
const NMS_IOU_THRESHOLD: f32 = 0.45;
const MAX_DETECTIONS: usize = 5;

#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// ONNX face detector (YOLO-style single-class head). Returns candidate
/// boxes in original-image coordinates, best first.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    min_confidence: f32,
}

impl FaceDetector {
    pub fn new(model_path: &Path, min_confidence: f32) -> Result<Self, RecognitionError> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| RecognitionError::Model(format!("Failed to create environment: {}", e)))?,
        );

        if !model_path.exists() {
            return Err(RecognitionError::Model(format!(
                "Detector model not found at: {:?}",
                model_path
            )));
        }

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            min_confidence,
        })
    }

    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>, RecognitionError> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let resized = if image.width() == INPUT_WIDTH && image.height() == INPUT_HEIGHT {
            image.clone()
        } else {
            image.resize_exact(INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle)
        };

        let input_array = image_to_array(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        // Scale coordinates back to original image dimensions
        let scale_x = orig_width / INPUT_WIDTH as f32;
        let scale_y = orig_height / INPUT_HEIGHT as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>, RecognitionError> {
        let mut faces = Vec::new();

        let Some(output) = outputs.first() else {
            return Ok(faces);
        };
        let output = output.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let Some(raw) = output.as_slice() else {
            return Ok(faces);
        };

        // YOLO heads come in [1, N, 5] or transposed [1, 5, N]; each
        // prediction is [x_center, y_center, width, height, confidence].
        let (num_predictions, stride_len, transposed) = match shape.as_slice() {
            [_, a, b] if b > a && *a <= 10 => (*b, *a, true),
            [_, a, b] => (*a, *b, false),
            [a, b] => (*a, *b, false),
            other => {
                tracing::warn!("Unexpected detector output shape: {:?}", other);
                return Ok(faces);
            }
        };

        for i in 0..num_predictions {
            let (xc_raw, yc_raw, w_raw, h_raw, confidence) = if transposed {
                (
                    raw[i],
                    raw[num_predictions + i],
                    raw[2 * num_predictions + i],
                    raw[3 * num_predictions + i],
                    if stride_len > 4 { raw[4 * num_predictions + i] } else { 0.0 },
                )
            } else {
                let base = i * stride_len;
                (
                    raw[base],
                    raw[base + 1],
                    raw[base + 2],
                    raw[base + 3],
                    if stride_len > 4 { raw[base + 4] } else { 0.0 },
                )
            };

            if confidence <= 0.001 {
                continue;
            }

            // Some exports emit normalized coordinates, others pixel space
            let scale = if xc_raw > 1.0 || yc_raw > 1.0 || w_raw > 1.0 || h_raw > 1.0 {
                1.0
            } else {
                INPUT_WIDTH as f32
            };
            let (xc, yc, w, h) = (xc_raw * scale, yc_raw * scale, w_raw * scale, h_raw * scale);

            let x1 = (xc - w / 2.0).max(0.0);
            let y1 = (yc - h / 2.0).max(0.0);
            let x2 = (xc + w / 2.0).min(INPUT_WIDTH as f32);
            let y2 = (yc + h / 2.0).min(INPUT_HEIGHT as f32);

            if x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
                faces.push(FaceBox { x1, y1, x2, y2, confidence });
            }
        }

        // NMS first on everything, then the confidence cut, so duplicate
        // boxes of a real face cannot crowd out a weaker second face.
        faces = apply_nms(faces, NMS_IOU_THRESHOLD);
        faces.retain(|face| face.confidence >= self.min_confidence);
        faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        faces.truncate(MAX_DETECTIONS);

        Ok(faces)
    }
}

fn image_to_array(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    let mut array = Array4::<f32>::zeros((1, 3, height, width));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    array
}

fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    let mut indices: Vec<usize> = (0..boxes.len()).collect();

    while let Some(&i) = indices.first() {
        keep.push(boxes[i].clone());
        indices = indices[1..]
            .iter()
            .filter(|&&j| iou(&boxes[i], &boxes[j]) < iou_threshold)
            .copied()
            .collect();
    }

    keep
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
