use rollcall_core::{TimeWindow, DEFAULT_DISTANCE_THRESHOLD};
use std::path::PathBuf;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Dataset directory with one sub-directory of enrollment images per identity.
    pub dataset_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Maximum Euclidean embedding distance for a positive match.
    pub distance_threshold: f32,
    /// Daily window during which attendance may be marked.
    pub window: TimeWindow,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        Self {
            dataset_dir: std::env::var("ROLLCALL_DATASET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dataset")),
            model_dir,
            db_path,
            distance_threshold: env_f32("ROLLCALL_DISTANCE_THRESHOLD", DEFAULT_DISTANCE_THRESHOLD),
            window: window_from_env(),
            bus: match std::env::var("ROLLCALL_BUS").as_deref() {
                Ok("system") => BusKind::System,
                _ => BusKind::Session,
            },
        }
    }
}

fn window_from_env() -> TimeWindow {
    window_from(
        std::env::var("ROLLCALL_WINDOW_START").ok(),
        std::env::var("ROLLCALL_WINDOW_END").ok(),
    )
}

fn window_from(start: Option<String>, end: Option<String>) -> TimeWindow {
    let fallback = TimeWindow::default();
    match (start, end) {
        (None, None) => fallback,
        (Some(start), Some(end)) => match TimeWindow::parse(&start, &end) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(error = %e, %fallback, "invalid attendance window; using default");
                fallback
            }
        },
        (start, end) => {
            tracing::warn!(
                start = start.as_deref().unwrap_or("<unset>"),
                end = end.as_deref().unwrap_or("<unset>"),
                %fallback,
                "ROLLCALL_WINDOW_START and ROLLCALL_WINDOW_END must be set together; using default"
            );
            fallback
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
