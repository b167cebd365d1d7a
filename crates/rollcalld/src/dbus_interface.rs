use crate::engine::{EngineError, EngineHandle};
use rollcall_core::{LedgerError, RecognitionService, RecognizeError};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    service: Arc<RecognitionService>,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, service: Arc<RecognitionService>) -> Self {
        Self { engine, service }
    }

    /// Run a ledger query on the blocking pool. The ledger serializes access
    /// behind a mutex that the engine thread holds while it marks attendance.
    async fn with_ledger<T, F>(&self, f: F) -> zbus::fdo::Result<T>
    where
        F: FnOnce(&RecognitionService) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || f(&service))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("ledger task failed: {e}")))?
            .map_err(ledger_error)
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Recognize faces in an encoded image and mark attendance for `subject`.
    /// Returns a JSON array of the identities newly marked.
    async fn recognize(&self, subject: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(subject, bytes = image.len(), "recognize requested");
        if image.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("subject and image required".into()));
        }

        let now = chrono::Local::now().naive_local();
        let names = self
            .engine
            .recognize(subject.to_string(), image, now)
            .await
            .map_err(engine_error)?;

        Ok(serde_json::json!(names).to_string())
    }

    /// All attendance records in ledger order, as a JSON array.
    async fn list_records(&self) -> zbus::fdo::Result<String> {
        let records = self.with_ledger(|service| service.records()).await?;
        let rows: Vec<_> = records
            .iter()
            .enumerate()
            .map(|(index, r)| {
                serde_json::json!({
                    "index": index,
                    "identity": r.identity,
                    "time": r.time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "subject": r.subject,
                })
            })
            .collect();
        Ok(serde_json::Value::Array(rows).to_string())
    }

    /// Enrolled, present, and absent identity counts plus the absentee list.
    async fn report(&self) -> zbus::fdo::Result<String> {
        let report = self.with_ledger(|service| service.report()).await?;
        serde_json::to_string(&report).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Delete the record at `index`. Returns false if the index is out of range.
    async fn delete_record(&self, index: i64) -> zbus::fdo::Result<bool> {
        tracing::info!(index, "delete requested");
        self.with_ledger(move |service| service.delete_record(index)).await
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let gallery = self.service.gallery();
        let records = self.with_ledger(|service| service.ledger().len()).await?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": gallery.identity_count(),
            "embeddings": gallery.len(),
            "window": self.service.window().to_string(),
            "distance_threshold": self.service.threshold(),
            "records": records,
        })
        .to_string())
    }
}

fn engine_error(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Recognize(e) => recognize_error(e),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn recognize_error(err: RecognizeError) -> zbus::fdo::Error {
    match err {
        RecognizeError::InvalidSubject => zbus::fdo::Error::InvalidArgs(err.to_string()),
        RecognizeError::WindowClosed { .. } => zbus::fdo::Error::AccessDenied(err.to_string()),
        RecognizeError::Decode(_) | RecognizeError::Extraction(_) | RecognizeError::Ledger(_) => {
            zbus::fdo::Error::Failed(err.to_string())
        }
    }
}

fn ledger_error(err: LedgerError) -> zbus::fdo::Error {
    tracing::error!(error = %err, "ledger access failed");
    zbus::fdo::Error::Failed(err.to_string())
}
