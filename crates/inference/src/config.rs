use crate::backend::{BackendOptions, ExecutionProvider};
use std::path::PathBuf;

/// Everything needed to build a detector at startup.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub font_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
    pub execution_provider: ExecutionProvider,
}

impl DetectorConfig {
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            provider: self.execution_provider,
            intra_threads: self.intra_threads,
        }
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            model_path: PathBuf::from("/models/best.onnx"),
            font_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
            intra_threads: 1,
            execution_provider: ExecutionProvider::Cpu,
        }
    }
}
