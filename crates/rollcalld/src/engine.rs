use chrono::NaiveDateTime;
use rollcall_core::{FaceExtractor, RecognitionService, RecognizeError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Recognize(#[from] RecognizeError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Recognize {
        subject: String,
        image: Vec<u8>,
        now: NaiveDateTime,
        reply: oneshot::Sender<Result<Vec<String>, RecognizeError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode `image`, extract faces, and mark attendance for `subject` as of `now`.
    /// Returns the identities newly marked.
    pub async fn recognize(
        &self,
        subject: String,
        image: Vec<u8>,
        now: NaiveDateTime,
    ) -> Result<Vec<String>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                subject,
                image,
                now,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the extractor (inference sessions are not shareable) and
/// handles one recognition at a time.
pub fn spawn_engine<E>(
    mut extractor: E,
    service: Arc<RecognitionService>,
) -> Result<EngineHandle, EngineError>
where
    E: FaceExtractor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize {
                        subject,
                        image,
                        now,
                        reply,
                    } => {
                        let result = service.recognize_image(&mut extractor, &image, &subject, now);
                        if let Err(e) = &result {
                            tracing::warn!(subject = %subject, error = %e, "recognition failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use rollcall_core::{
        AttendanceLedger, Embedding, ExtractError, Gallery, GalleryEntry, TimeWindow,
    };
    use std::io::Cursor;

    /// One face per image, embedded as the normalized colour of the first pixel.
    struct ColorExtractor;

    impl FaceExtractor for ColorExtractor {
        fn extract_faces(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, ExtractError> {
            let Rgb([r, g, b]) = *image.to_rgb8().get_pixel(0, 0);
            Ok(vec![Embedding::new(vec![
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
            ])])
        }
    }

    fn png(color: [u8; 3]) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        RgbImage::from_pixel(2, 2, Rgb(color))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn at(time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2024-03-01 {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn service() -> Arc<RecognitionService> {
        let gallery = Gallery::from_entries(vec![
            GalleryEntry::new("A", Embedding::new(vec![1.0, 0.0, 0.0])),
            GalleryEntry::new("B", Embedding::new(vec![0.0, 1.0, 0.0])),
        ]);
        Arc::new(RecognitionService::new(
            Arc::new(gallery),
            Arc::new(AttendanceLedger::open_in_memory().unwrap()),
            TimeWindow::default(),
            0.6,
        ))
    }

    #[tokio::test]
    async fn test_recognize_through_engine() {
        let service = service();
        let engine = spawn_engine(ColorExtractor, Arc::clone(&service)).unwrap();

        let marked = engine
            .recognize("Math".into(), png([0, 255, 0]), at("10:05:00"))
            .await
            .unwrap();
        assert_eq!(marked, ["B"]);

        let again = engine
            .recognize("Math".into(), png([0, 255, 0]), at("10:06:00"))
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(service.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_reports_window_closed() {
        let engine = spawn_engine(ColorExtractor, service()).unwrap();
        let err = engine
            .recognize("Math".into(), png([255, 0, 0]), at("11:00:00"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Recognize(RecognizeError::WindowClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_engine_reports_decode_failure() {
        let engine = spawn_engine(ColorExtractor, service()).unwrap();
        let err = engine
            .recognize("Math".into(), b"not a png".to_vec(), at("10:10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Recognize(RecognizeError::Decode(_))));
    }
}
