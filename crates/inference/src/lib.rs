pub mod annotate;
pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod labels;
pub mod postprocessing;

// Re-export commonly used types for convenience
pub use annotate::Annotator;
pub use backend::{BackendOptions, ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::DetectorConfig;
pub use detector::{DetectionResult, Detector, YoloDetector};
pub use error::DetectionError;
pub use labels::ClassNames;
pub use postprocessing::{Detection, PostProcessor, TransformParams};
