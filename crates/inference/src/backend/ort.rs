use super::{BackendOptions, ExecutionProvider, InferenceBackend, InferenceOutput};
use crate::labels::ClassNames;
use anyhow::Context;
use ndarray::{Array, IxDyn};
use ort::{
    session::{
        Session,
        builder::{GraphOptimizationLevel, SessionBuilder},
    },
    value::TensorRef,
};

/// Tensor names written by the standard YOLO ONNX export.
const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";
const NAMES_METADATA_KEY: &str = "names";

pub struct OrtBackend {
    session: Session,
    class_names: Option<ClassNames>,
}

impl OrtBackend {
    pub fn load_model_with_options(path: &str, options: &BackendOptions) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?;

        let builder = match options.provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                with_cuda(builder)?
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
                builder
            }
        };

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("failed to load ONNX model from {}", path))?;

        let class_names = session
            .metadata()
            .ok()
            .and_then(|metadata| metadata.custom(NAMES_METADATA_KEY))
            .and_then(|raw| ClassNames::from_metadata(&raw));

        match &class_names {
            Some(names) => tracing::info!(classes = names.len(), "Using class names from model metadata"),
            None => tracing::info!("Model carries no class names, falling back to COCO labels"),
        }

        tracing::info!("Model loaded from {}", path);
        Ok(Self {
            session,
            class_names,
        })
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(builder: SessionBuilder) -> anyhow::Result<SessionBuilder> {
    Ok(builder.with_execution_providers([
        ort::execution_providers::CUDAExecutionProvider::default()
            .with_device_id(0)
            .build()
            .error_on_failure(),
    ])?)
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(_builder: SessionBuilder) -> anyhow::Result<SessionBuilder> {
    anyhow::bail!("CUDA execution provider requested but this build lacks the `cuda` feature")
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str, options: &BackendOptions) -> anyhow::Result<Self> {
        Self::load_model_with_options(path, options)
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            INPUT_NAME => TensorRef::from_array_view(images.view())?
        ])?;

        let predictions = outputs[OUTPUT_NAME].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            predictions: predictions.into_owned(),
        })
    }

    fn class_names(&self) -> Option<ClassNames> {
        self.class_names.clone()
    }
}
