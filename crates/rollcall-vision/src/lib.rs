//! rollcall-vision — Face embedding extraction.
//!
//! Uses SCRFD for face detection and ArcFace for recognition, both running
//! on CPU via ONNX Runtime, behind the [`FaceExtractor`] seam of
//! `rollcall-core`.

pub mod alignment;
pub mod detector;
pub mod recognizer;

pub use detector::{DetectorError, FaceBox, ScrfdDetector};
pub use recognizer::{ArcFaceRecognizer, RecognizerError};

use image::DynamicImage;
use rollcall_core::{Embedding, ExtractError, FaceExtractor};
use std::path::Path;

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detection plus embedding pipeline: detect, align, embed each face.
pub struct OnnxFaceExtractor {
    detector: ScrfdDetector,
    recognizer: ArcFaceRecognizer,
}

impl OnnxFaceExtractor {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, VisionError> {
        let detector = ScrfdDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = ArcFaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceExtractor for OnnxFaceExtractor {
    fn extract_faces(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, ExtractError> {
        let rgb = image.to_rgb8();
        let faces = self
            .detector
            .detect(&rgb)
            .map_err(|e| ExtractError::Detection(e.to_string().into()))?;

        tracing::debug!(faces = faces.len(), "detected faces");

        faces
            .iter()
            .map(|face| {
                let aligned = alignment::align_face(&rgb, &face.landmarks);
                self.recognizer
                    .embed(&aligned)
                    .map_err(|e| ExtractError::Embedding(e.to_string().into()))
            })
            .collect()
    }
}
