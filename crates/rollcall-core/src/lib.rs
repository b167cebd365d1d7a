//! rollcall-core — Attendance marking from face embeddings.
//!
//! Matches query embeddings against an enrolled gallery, gates marking on a
//! daily time window, and records at most one attendance event per
//! identity, subject and day in a SQLite-backed ledger.

pub mod extractor;
pub mod gallery;
pub mod gate;
pub mod ledger;
pub mod matcher;
pub mod service;
pub mod types;

pub use extractor::{ExtractError, FaceExtractor, SingleFace};
pub use gallery::{Gallery, GalleryError};
pub use gate::{TimeWindow, WindowParseError};
pub use ledger::{AttendanceLedger, AttendanceRecord, LedgerError};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_DISTANCE_THRESHOLD};
pub use service::{AttendanceReport, RecognitionService, RecognizeError};
pub use types::{Embedding, GalleryEntry};
