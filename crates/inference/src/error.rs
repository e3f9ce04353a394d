use thiserror::Error;

/// Failure of a single detection request. The detector stays usable after
/// any of these.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Target size must be positive, got {0}")]
    InvalidTargetSize(u32),

    #[error("Cannot run detection on an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error("Preprocessing failed: {0}")]
    Preprocess(anyhow::Error),

    #[error("Inference failed: {0}")]
    Inference(anyhow::Error),

    #[error("Postprocessing failed: {0}")]
    Postprocess(anyhow::Error),

    #[error("Detection timed out after {0} seconds")]
    Timeout(u64),

    #[error("Detection task aborted: {0}")]
    Aborted(String),
}
