use crate::error::SessionError;
use crate::upload::{UploadedImage, decode_upload};
use image::{ImageFormat, RgbImage};
use inference::{Detection, DetectionError, DetectionResult, Detector};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

enum SessionState {
    Idle,
    ImageLoaded {
        image: UploadedImage,
    },
    /// `previous` is restored if the detection is abandoned.
    Detecting {
        image: UploadedImage,
        previous: Option<Arc<DetectionResult>>,
    },
    Detected {
        image: UploadedImage,
        result: Arc<DetectionResult>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateName {
    Idle,
    ImageLoaded,
    Detecting,
    Detected,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: StateName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One user's upload, detect, display round trip.
///
/// Holds at most one image and one result. Every operation is a discrete
/// transition; callers serialize access.
pub struct Session {
    id: Uuid,
    state: SessionState,
    last_error: Option<String>,
    last_active: Instant,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            last_error: None,
            last_active: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> StateName {
        match self.state {
            SessionState::Idle => StateName::Idle,
            SessionState::ImageLoaded { .. } => StateName::ImageLoaded,
            SessionState::Detecting { .. } => StateName::Detecting,
            SessionState::Detected { .. } => StateName::Detected,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// Decode and store an upload, replacing any image and result.
    ///
    /// On failure the previous image and result stay in place and the error
    /// is recorded for display.
    pub fn accept_upload(&mut self, file_name: &str, bytes: &[u8]) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Detecting { .. }) {
            return Err(SessionError::Busy);
        }
        self.apply_upload(decode_upload(file_name, bytes))
    }

    /// Store the outcome of a [`decode_upload`] done elsewhere, with the same
    /// rules as [`Session::accept_upload`].
    pub fn apply_upload(
        &mut self,
        decoded: Result<UploadedImage, SessionError>,
    ) -> Result<(), SessionError> {
        self.touch();
        if matches!(self.state, SessionState::Detecting { .. }) {
            return Err(SessionError::Busy);
        }

        match decoded {
            Ok(image) => {
                tracing::info!(
                    session = %self.id,
                    file_name = %image.file_name,
                    width = image.pixels.width(),
                    height = image.pixels.height(),
                    "Image uploaded"
                );
                self.state = SessionState::ImageLoaded { image };
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "Upload rejected");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Enter `Detecting` and hand out the image to run on.
    pub fn begin_detection(&mut self) -> Result<Arc<RgbImage>, SessionError> {
        self.touch();
        let (image, previous) = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::ImageLoaded { image } => (image, None),
            SessionState::Detected { image, result } => (image, Some(result)),
            SessionState::Idle => return Err(SessionError::NoImage),
            state @ SessionState::Detecting { .. } => {
                self.state = state;
                return Err(SessionError::Busy);
            }
        };

        let pixels = Arc::clone(&image.pixels);
        self.state = SessionState::Detecting { image, previous };
        Ok(pixels)
    }

    /// Apply the detector's outcome. A failure returns to `ImageLoaded` and
    /// is recorded; the prior result is not kept.
    pub fn finish_detection(
        &mut self,
        outcome: Result<DetectionResult, DetectionError>,
    ) -> Result<(), SessionError> {
        self.touch();
        let image = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Detecting { image, .. } => image,
            other => {
                self.state = other;
                tracing::warn!(session = %self.id, "Discarding detection outcome, session moved on");
                return outcome.map(|_| ()).map_err(SessionError::from);
            }
        };

        match outcome {
            Ok(result) => {
                tracing::info!(
                    session = %self.id,
                    detections = result.detections.len(),
                    inference_ms = result.inference_ms,
                    "Detection stored"
                );
                self.state = SessionState::Detected {
                    image,
                    result: Arc::new(result),
                };
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::ImageLoaded { image };
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Give up on an in-flight detection and restore the state it started
    /// from. The reason is recorded and returned.
    pub fn abandon_detection(&mut self, reason: DetectionError) -> SessionError {
        self.touch();
        self.state = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Detecting {
                image,
                previous: Some(result),
            } => SessionState::Detected { image, result },
            SessionState::Detecting {
                image,
                previous: None,
            } => SessionState::ImageLoaded { image },
            other => other,
        };
        tracing::warn!(session = %self.id, error = %reason, "Detection abandoned");
        self.last_error = Some(reason.to_string());
        reason.into()
    }

    /// Run detection to completion on the calling thread.
    pub fn request_detection(
        &mut self,
        detector: &dyn Detector,
        target_size: u32,
    ) -> Result<(), SessionError> {
        let image = self.begin_detection()?;
        let outcome = detector.predict(&image, target_size);
        self.finish_detection(outcome)
    }

    pub fn reset(&mut self) {
        self.touch();
        self.state = SessionState::Idle;
        self.last_error = None;
        tracing::info!(session = %self.id, "Session reset");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (image, result) = match &self.state {
            SessionState::Idle => (None, None),
            SessionState::ImageLoaded { image } | SessionState::Detecting { image, .. } => {
                (Some(image), None)
            }
            SessionState::Detected { image, result } => (Some(image), Some(result)),
        };

        SessionSnapshot {
            id: self.id,
            state: self.state(),
            image: image.map(|image| ImageInfo {
                file_name: image.file_name.clone(),
                width: image.pixels.width(),
                height: image.pixels.height(),
            }),
            detections: result.map(|result| result.detections.clone()),
            inference_ms: result.map(|result| result.inference_ms),
            error: self.last_error.clone(),
        }
    }

    /// The uploaded image as PNG, if one is loaded.
    pub fn input_png(&self) -> Result<Option<Vec<u8>>, SessionError> {
        match &self.state {
            SessionState::Idle => Ok(None),
            SessionState::ImageLoaded { image }
            | SessionState::Detecting { image, .. }
            | SessionState::Detected { image, .. } => encode_png(&image.pixels).map(Some),
        }
    }

    /// The annotated result as PNG, only in `Detected`.
    pub fn annotated_png(&self) -> Result<Option<Vec<u8>>, SessionError> {
        match &self.state {
            SessionState::Detected { result, .. } => encode_png(&result.annotated).map(Some),
            _ => Ok(None),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, SessionError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
