use inference::DetectionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unsupported file type {0:?}, expected jpg, jpeg or png")]
    UnsupportedType(String),

    #[error("Could not decode {file_name}: {reason}")]
    Decode { file_name: String, reason: String },

    #[error("No image loaded, upload an image first")]
    NoImage,

    #[error("Detection already in progress")]
    Busy,

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

impl SessionError {
    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::UnsupportedType(_) => "unsupported_type",
            SessionError::Decode { .. } => "decode_error",
            SessionError::NoImage => "no_image",
            SessionError::Busy => "busy",
            SessionError::Detection(DetectionError::Timeout(_)) => "timeout",
            SessionError::Detection(_) => "detection_error",
            SessionError::Encode(_) => "encode_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(SessionError::NoImage.kind(), "no_image");
        assert_eq!(
            SessionError::from(DetectionError::Timeout(30)).kind(),
            "timeout"
        );
        assert_eq!(
            SessionError::from(DetectionError::Aborted("worker panicked".to_string())).kind(),
            "detection_error"
        );
    }

    #[test]
    fn test_detection_error_message_is_passed_through() {
        let err = SessionError::from(DetectionError::Timeout(5));
        assert_eq!(err.to_string(), "Detection timed out after 5 seconds");
    }
}
