//! Seam to the face detection and embedding backend.

use crate::types::Embedding;
use image::DynamicImage;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("face detection failed: {0}")]
    Detection(#[source] BoxError),
    #[error("embedding extraction failed: {0}")]
    Embedding(#[source] BoxError),
}

/// Outcome of extracting an enrollment image, which must show exactly one face.
#[derive(Debug, Clone, PartialEq)]
pub enum SingleFace {
    One(Embedding),
    /// Zero or several faces were found.
    Rejected { faces: usize },
}

/// Turns a decoded image into face embeddings, one per detected face.
///
/// Takes `&mut self` because inference sessions are stateful.
pub trait FaceExtractor {
    fn extract_faces(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, ExtractError>;

    fn extract_single(&mut self, image: &DynamicImage) -> Result<SingleFace, ExtractError> {
        let mut faces = self.extract_faces(image)?;
        if faces.len() == 1 {
            Ok(SingleFace::One(faces.remove(0)))
        } else {
            Ok(SingleFace::Rejected { faces: faces.len() })
        }
    }
}

impl<E: FaceExtractor + ?Sized> FaceExtractor for Box<E> {
    fn extract_faces(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, ExtractError> {
        (**self).extract_faces(image)
    }

    fn extract_single(&mut self, image: &DynamicImage) -> Result<SingleFace, ExtractError> {
        (**self).extract_single(image)
    }
}
