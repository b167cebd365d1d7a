//! Nearest-neighbour matching of a probe embedding against the gallery.

use crate::types::{Embedding, GalleryEntry};

/// Default Euclidean acceptance distance for L2-normalized ArcFace embeddings.
///
/// For unit vectors `d = sqrt(2 - 2 * cos)`, so 1.10 accepts a cosine
/// similarity of roughly 0.40 or better.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.10;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Distance to the closest gallery entry, `f32::INFINITY` if there was none.
    pub distance: f32,
    /// Gallery position of the closest entry, matched or not.
    pub best_index: Option<usize>,
    /// Identity of the matched entry; `None` when the probe is unknown.
    pub identity: Option<String>,
}

impl MatchResult {
    fn unknown(distance: f32, best_index: Option<usize>) -> Self {
        Self {
            distance,
            best_index,
            identity: None,
        }
    }

    /// Whether the probe was accepted as an enrolled identity.
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Each distance is computed once and drives both the argmin and the
/// accept decision. Ties go to the earliest gallery entry. Entries of a
/// different dimension are not candidates, and NaN distances never win.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let Some(distance) = probe.euclidean_distance(&entry.embedding) else {
                continue;
            };
            let closer = match best {
                None => !distance.is_nan(),
                Some((_, best_distance)) => distance < best_distance,
            };
            if closer {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance <= threshold => MatchResult {
                distance,
                best_index: Some(idx),
                identity: Some(gallery[idx].identity.clone()),
            },
            Some((idx, distance)) => MatchResult::unknown(distance, Some(idx)),
            None => MatchResult::unknown(f32::INFINITY, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(identity: &str, values: &[f32]) -> GalleryEntry {
        GalleryEntry::new(identity, Embedding::new(values.to_vec()))
    }

    #[test]
    fn test_exact_reference_matches() {
        let gallery = vec![entry("A", &[1.0, 0.0, 0.0]), entry("B", &[0.0, 1.0, 0.0])];
        let probe = Embedding::new(vec![0.0, 1.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6);
        assert!(result.is_match());
        assert_eq!(result.identity.as_deref(), Some("B"));
        assert_eq!(result.best_index, Some(1));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &[], 0.6);
        assert!(!result.is_match());
        assert_eq!(result.identity, None);
        assert_eq!(result.best_index, None);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_closest_beyond_threshold_is_unknown() {
        let gallery = vec![entry("A", &[1.0, 0.0])];
        let probe = Embedding::new(vec![0.0, 1.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6);
        assert!(!result.is_match());
        assert_eq!(result.identity, None);
        // Closest candidate is still reported for diagnostics.
        assert_eq!(result.best_index, Some(0));
        assert!((result.distance - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gallery = vec![entry("A", &[0.0, 0.0])];
        let probe = Embedding::new(vec![0.5, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert!(result.is_match());
        assert_eq!(result.identity.as_deref(), Some("A"));
    }

    #[test]
    fn test_picks_minimum_not_first_within_threshold() {
        let gallery = vec![
            entry("far", &[0.4, 0.0]),
            entry("near", &[0.1, 0.0]),
            entry("mid", &[0.2, 0.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6);
        assert_eq!(result.identity.as_deref(), Some("near"));
        assert_eq!(result.best_index, Some(1));
    }

    #[test]
    fn test_tie_goes_to_first_entry() {
        let gallery = vec![
            entry("decoy", &[0.0, 5.0]),
            entry("first", &[1.0, 0.0]),
            entry("second", &[-1.0, 0.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 1.0);
        assert!(result.is_match());
        assert_eq!(result.identity.as_deref(), Some("first"));
        assert_eq!(result.best_index, Some(1));
    }

    #[test]
    fn test_skips_mismatched_dimensions() {
        let gallery = vec![entry("wrong-dim", &[0.0, 0.0, 0.0]), entry("A", &[0.1, 0.0])];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6);
        assert_eq!(result.identity.as_deref(), Some("A"));
        assert_eq!(result.best_index, Some(1));
    }

    #[test]
    fn test_nan_distance_never_wins() {
        let gallery = vec![entry("nan", &[f32::NAN, 0.0]), entry("A", &[0.2, 0.0])];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6);
        assert_eq!(result.identity.as_deref(), Some("A"));
    }

    #[test]
    fn test_multiple_references_per_identity() {
        let gallery = vec![
            entry("A", &[1.0, 0.0]),
            entry("B", &[0.0, 1.0]),
            entry("A", &[0.7, 0.7]),
        ];
        let probe = Embedding::new(vec![0.69, 0.71]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6);
        assert_eq!(result.identity.as_deref(), Some("A"));
        assert_eq!(result.best_index, Some(2));
    }
}
