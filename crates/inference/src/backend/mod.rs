use crate::labels::ClassNames;
use ndarray::{Array, IxDyn};
use serde::Deserialize;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            provider: ExecutionProvider::Cpu,
            intra_threads: 4,
        }
    }
}

pub trait InferenceBackend: Send {
    fn load_model(path: &str, options: &BackendOptions) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run a forward pass on a preprocessed `[1, 3, H, W]` tensor.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Class names embedded in the model file, when the exporter wrote them.
    fn class_names(&self) -> Option<ClassNames> {
        None
    }
}

pub struct InferenceOutput {
    pub predictions: ndarray::ArrayD<f32>, // [1, 4 + num_classes, num_anchors] cxcywh in input pixels
}
