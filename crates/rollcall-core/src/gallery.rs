//! Enrolled reference embeddings, loaded once at startup.
//!
//! The dataset layout is one directory per identity, named after the
//! identity, holding that person's enrollment images:
//!
//! ```text
//! dataset/
//!   21CS001_Asha/
//!     front.jpg
//!     glasses.jpg
//!   21CS002_Ravi/
//!     front.png
//! ```
//!
//! Each enrollment image must contain exactly one face. Images that do not,
//! or that fail to decode or extract, are logged and skipped; a single bad
//! file never aborts the load.

use crate::extractor::{FaceExtractor, SingleFace};
use crate::types::{Embedding, GalleryEntry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read dataset directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, read-only set of (embedding, identity) references.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// Build the gallery from a dataset directory.
    ///
    /// Identities and images are visited in name order so the gallery order,
    /// and therefore tie-breaking in the matcher, is stable across runs.
    pub fn load<E>(dataset_dir: &Path, extractor: &mut E) -> Result<Self, GalleryError>
    where
        E: FaceExtractor + ?Sized,
    {
        let mut entries = Vec::new();

        for identity_dir in sorted_entries(dataset_dir)? {
            if !identity_dir.is_dir() {
                continue;
            }
            let Some(identity) = identity_dir.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %identity_dir.display(), "skipping identity with non-UTF-8 name");
                continue;
            };

            let images = match sorted_entries(&identity_dir) {
                Ok(images) => images,
                Err(e) => {
                    tracing::warn!(identity, error = %e, "skipping unreadable identity directory");
                    continue;
                }
            };

            for image_path in images.iter().filter(|p| p.is_file()) {
                if let Some(embedding) = enroll_image(image_path, extractor) {
                    entries.push(GalleryEntry::new(identity, embedding));
                }
            }
        }

        let gallery = Self { entries };
        tracing::info!(
            identities = gallery.identity_count(),
            embeddings = gallery.len(),
            path = %dataset_dir.display(),
            "loaded face gallery"
        );
        Ok(gallery)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct enrolled identities, sorted.
    pub fn identities(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.identity.clone()).collect()
    }

    pub fn identity_count(&self) -> usize {
        self.identities().len()
    }
}

/// Extract the single reference embedding from one enrollment image.
fn enroll_image<E>(path: &Path, extractor: &mut E) -> Option<Embedding>
where
    E: FaceExtractor + ?Sized,
{
    let image = match image::open(path) {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping undecodable enrollment image");
            return None;
        }
    };

    match extractor.extract_single(&image) {
        Ok(SingleFace::One(embedding)) => {
            tracing::debug!(path = %path.display(), "enrolled image");
            Some(embedding)
        }
        Ok(SingleFace::Rejected { faces }) => {
            tracing::warn!(
                path = %path.display(),
                faces,
                "skipping enrollment image: expected exactly one face"
            );
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping enrollment image: extraction failed");
            None
        }
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let io_err = |source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractError;
    use image::{DynamicImage, Rgb, RgbImage};

    /// Encodes the face count in the red channel of the first pixel:
    /// 0 → no face, 255 → two faces, 200 → extraction error, otherwise one
    /// face whose embedding is the (r, g) pair.
    struct PixelExtractor;

    impl FaceExtractor for PixelExtractor {
        fn extract_faces(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, ExtractError> {
            let Rgb([r, g, _]) = *image.to_rgb8().get_pixel(0, 0);
            match r {
                0 => Ok(vec![]),
                255 => Ok(vec![Embedding::new(vec![1.0, 1.0]); 2]),
                200 => Err(ExtractError::Detection("synthetic failure".into())),
                _ => Ok(vec![Embedding::new(vec![r as f32, g as f32])]),
            }
        }
    }

    fn write_image(dir: &Path, name: &str, r: u8, g: u8) {
        RgbImage::from_pixel(4, 4, Rgb([r, g, 0]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_load_skips_bad_images() {
        let root = tempfile::tempdir().unwrap();
        let alice = root.path().join("alice");
        let bob = root.path().join("bob");
        let carol = root.path().join("carol");
        for dir in [&alice, &bob, &carol] {
            std::fs::create_dir(dir).unwrap();
        }

        write_image(&alice, "a1.png", 10, 1);
        write_image(&alice, "a2.png", 11, 2);
        write_image(&alice, "group.png", 255, 0);
        write_image(&bob, "b1.png", 20, 3);
        write_image(&bob, "empty.png", 0, 0);
        write_image(&bob, "broken.png", 200, 0);
        std::fs::write(bob.join("notes.txt"), b"not an image").unwrap();
        write_image(&carol, "nobody.png", 0, 0);
        std::fs::write(root.path().join("README.txt"), b"top-level file").unwrap();

        let gallery = Gallery::load(root.path(), &mut PixelExtractor).unwrap();

        let labels: Vec<&str> = gallery.entries().iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(labels, ["alice", "alice", "bob"]);
        assert_eq!(gallery.entries()[0].embedding, Embedding::new(vec![10.0, 1.0]));
        assert_eq!(gallery.entries()[2].embedding, Embedding::new(vec![20.0, 3.0]));
        // carol has no usable image, so she is not enrolled at all.
        assert_eq!(gallery.identity_count(), 2);
    }

    #[test]
    fn test_load_missing_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = Gallery::load(&missing, &mut PixelExtractor).unwrap_err();
        assert!(matches!(err, GalleryError::Io { .. }));
    }

    #[test]
    fn test_load_empty_dataset() {
        let root = tempfile::tempdir().unwrap();
        let gallery = Gallery::load(root.path(), &mut PixelExtractor).unwrap();
        assert!(gallery.is_empty());
        assert_eq!(gallery.identity_count(), 0);
    }

    #[test]
    fn test_identities_are_distinct_and_sorted() {
        let gallery = Gallery::from_entries(vec![
            GalleryEntry::new("B", Embedding::new(vec![0.0])),
            GalleryEntry::new("A", Embedding::new(vec![1.0])),
            GalleryEntry::new("B", Embedding::new(vec![2.0])),
        ]);
        let ids: Vec<String> = gallery.identities().into_iter().collect();
        assert_eq!(ids, ["A", "B"]);
        assert_eq!(gallery.len(), 3);
    }
}
