//! Recognition orchestration: gate, match, and mark.

use crate::extractor::{ExtractError, FaceExtractor};
use crate::gallery::Gallery;
use crate::gate::TimeWindow;
use crate::ledger::{AttendanceLedger, AttendanceRecord, LedgerError};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::Embedding;
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("subject must not be empty")]
    InvalidSubject,
    #[error("attendance is only allowed {window}; it is {now}")]
    WindowClosed { window: TimeWindow, now: NaiveTime },
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

/// Enrolled-versus-present summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceReport {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    /// Enrolled identities with no record at all, sorted.
    pub absent_list: Vec<String>,
}

/// Marks attendance for recognized faces.
///
/// Owns shared handles to the gallery, which is read-only after load, and
/// the ledger, which serializes its own writes.
pub struct RecognitionService<M = EuclideanMatcher> {
    gallery: Arc<Gallery>,
    ledger: Arc<AttendanceLedger>,
    window: TimeWindow,
    threshold: f32,
    matcher: M,
}

impl RecognitionService {
    pub fn new(
        gallery: Arc<Gallery>,
        ledger: Arc<AttendanceLedger>,
        window: TimeWindow,
        threshold: f32,
    ) -> Self {
        Self::with_matcher(gallery, ledger, window, threshold, EuclideanMatcher)
    }
}

impl<M: Matcher> RecognitionService<M> {
    pub fn with_matcher(
        gallery: Arc<Gallery>,
        ledger: Arc<AttendanceLedger>,
        window: TimeWindow,
        threshold: f32,
        matcher: M,
    ) -> Self {
        Self {
            gallery,
            ledger,
            window,
            threshold,
            matcher,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Reject the request before any work if the subject is blank or the
    /// window is closed at `now`.
    pub fn admit(&self, subject: &str, now: NaiveDateTime) -> Result<(), RecognizeError> {
        if subject.trim().is_empty() {
            return Err(RecognizeError::InvalidSubject);
        }
        if !self.window.is_open(now.time()) {
            tracing::warn!(subject, window = %self.window, now = %now.time(), "marking rejected: window closed");
            return Err(RecognizeError::WindowClosed {
                window: self.window,
                now: now.time(),
            });
        }
        Ok(())
    }

    /// Match each embedding and mark every newly recognized identity.
    ///
    /// Returns the identities marked by this call, in order of first match.
    /// Unknown faces and identities already marked today are skipped. The
    /// window is checked once for the whole batch, and the marks are written
    /// in one transaction: on error nothing from this call is recorded.
    pub fn process(
        &self,
        embeddings: &[Embedding],
        subject: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<String>, RecognizeError> {
        self.admit(subject, now)?;

        let mut recognized = Vec::new();
        for (i, embedding) in embeddings.iter().enumerate() {
            let result = self
                .matcher
                .compare(embedding, self.gallery.entries(), self.threshold);

            match result.identity {
                Some(identity) => recognized.push(identity),
                None => tracing::debug!(face = i, distance = result.distance, "no gallery match"),
            }
        }

        let marked = self.ledger.mark_batch(&recognized, subject, now)?;

        tracing::info!(subject, faces = embeddings.len(), marked = marked.len(), "recognition processed");
        Ok(marked)
    }

    /// Decode an encoded image, extract its faces, and mark attendance.
    ///
    /// An image with no faces is not an error and marks nobody.
    pub fn recognize_image<E>(
        &self,
        extractor: &mut E,
        image_bytes: &[u8],
        subject: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<String>, RecognizeError>
    where
        E: FaceExtractor + ?Sized,
    {
        self.admit(subject, now)?;

        let image = image::load_from_memory(image_bytes)?;
        let embeddings = extractor.extract_faces(&image)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            faces = embeddings.len(),
            "extracted faces"
        );

        self.process(&embeddings, subject, now)
    }

    pub fn records(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.ledger.list_all()
    }

    /// Delete a record by position. Negative or out-of-range indices fail
    /// with `false` and leave the ledger unchanged.
    pub fn delete_record(&self, index: i64) -> Result<bool, LedgerError> {
        match usize::try_from(index) {
            Ok(index) => self.ledger.delete_at(index),
            Err(_) => {
                tracing::warn!(index, "delete failed: negative index");
                Ok(false)
            }
        }
    }

    /// Compare enrolled identities with those present in the ledger.
    pub fn report(&self) -> Result<AttendanceReport, LedgerError> {
        let enrolled = self.gallery.identities();
        let present = self.ledger.present_identities()?;
        let absent_list: Vec<String> = enrolled.difference(&present).cloned().collect();

        Ok(AttendanceReport {
            total: enrolled.len(),
            present: present.len(),
            absent: absent_list.len(),
            absent_list,
        })
    }
}
