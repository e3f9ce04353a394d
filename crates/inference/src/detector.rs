use crate::{
    annotate::Annotator,
    backend::InferenceBackend,
    config::DetectorConfig,
    error::DetectionError,
    postprocessing::{Detection, PostProcessor, TransformParams},
};
use anyhow::Context;
use common::span;
use image::RgbImage;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use preprocess::CpuPreProcessor;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Output of one detection request.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    /// Copy of the input with boxes drawn, same dimensions as the input.
    pub annotated: RgbImage,
    pub inference_ms: f64,
}

/// Opaque "image in, detection result out" capability.
///
/// Implementations are loaded once and shared read-only between sessions,
/// so `predict` takes `&self`.
pub trait Detector: Send + Sync {
    fn predict(&self, image: &RgbImage, target_size: u32)
    -> Result<DetectionResult, DetectionError>;

    /// Square input resolution the model was exported with.
    fn input_size(&self) -> u32;
}

struct DetectorMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    detections: Counter<u64>,
}

impl DetectorMetrics {
    fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0, 10.0,
        ];
        Self {
            duration: meter
                .f64_histogram("detector_inference_duration_seconds")
                .with_description("Time to process one image (preprocess + infer + postprocess + draw)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            requests: meter
                .u64_counter("detector_requests_total")
                .with_description("Detection requests by outcome")
                .build(),
            detections: meter
                .u64_counter("detector_detections_total")
                .with_description("Total boxes returned")
                .build(),
        }
    }
}

/// Stages that need exclusive access for a forward pass.
struct Stages<B> {
    backend: B,
    preprocessor: CpuPreProcessor,
}

/// YOLO-family detector: letterbox, forward pass, decode + NMS, draw.
pub struct YoloDetector<B: InferenceBackend> {
    stages: Mutex<Stages<B>>,
    postprocessor: PostProcessor,
    annotator: Annotator,
    input_size: u32,
    metrics: DetectorMetrics,
}

impl<B: InferenceBackend> YoloDetector<B> {
    /// Load the model and label font named in `config`.
    ///
    /// A missing or unloadable model is an error; callers treat it as fatal.
    pub fn load(config: &DetectorConfig) -> anyhow::Result<Self> {
        if !config.model_path.is_file() {
            anyhow::bail!("model file {} not found", config.model_path.display());
        }
        let model_path = config
            .model_path
            .to_str()
            .with_context(|| format!("model path {} is not UTF-8", config.model_path.display()))?;

        let backend = B::load_model(model_path, &config.backend_options())?;
        let annotator = Annotator::from_font_path(config.font_path.as_deref())?;

        Ok(Self::new(backend, annotator, config))
    }

    pub fn new(backend: B, annotator: Annotator, config: &DetectorConfig) -> Self {
        let class_names = backend.class_names().unwrap_or_default();
        let postprocessor = PostProcessor::new(
            config.confidence_threshold,
            config.iou_threshold,
            config.max_detections,
            class_names,
        );
        let preprocessor = CpuPreProcessor::new((config.input_size, config.input_size));

        Self {
            stages: Mutex::new(Stages {
                backend,
                preprocessor,
            }),
            postprocessor,
            annotator,
            input_size: config.input_size,
            metrics: DetectorMetrics::new("detector"),
        }
    }

    /// A panic during an earlier forward pass poisons the lock. The backend
    /// is reused as is and the preprocessor buffers are rebuilt.
    fn lock_stages(&self) -> MutexGuard<'_, Stages<B>> {
        self.stages.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovering detector after a panic in an earlier request");
            self.stages.clear_poison();
            let mut stages = poisoned.into_inner();
            let input_size = stages.preprocessor.input_size();
            stages.preprocessor = CpuPreProcessor::new(input_size);
            stages
        })
    }

    fn run(&self, image: &RgbImage, target_size: u32) -> Result<DetectionResult, DetectionError> {
        if target_size == 0 {
            return Err(DetectionError::InvalidTargetSize(target_size));
        }
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyImage { width, height });
        }

        let start = Instant::now();

        let (preprocessed, output) = {
            let mut stages = self.lock_stages();
            if stages.preprocessor.input_size() != (target_size, target_size) {
                stages.preprocessor = CpuPreProcessor::new((target_size, target_size));
            }
            let preprocessed = stages
                .preprocessor
                .preprocess_image(image)
                .map_err(DetectionError::Preprocess)?;
            let output = {
                let _s = span!("inference");
                stages
                    .backend
                    .infer(&preprocessed.tensor)
                    .map_err(DetectionError::Inference)?
            };
            (preprocessed, output)
        };

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale: preprocessed.scale,
            offset_x: preprocessed.offset_x,
            offset_y: preprocessed.offset_y,
        };
        let detections = self
            .postprocessor
            .parse_detections(&output.predictions.view(), &transform)
            .map_err(DetectionError::Postprocess)?;

        let mut annotated = image.clone();
        self.annotator.draw(&mut annotated, &detections);

        let elapsed = start.elapsed();
        Ok(DetectionResult {
            detections,
            annotated,
            inference_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    #[tracing::instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    fn predict(
        &self,
        image: &RgbImage,
        target_size: u32,
    ) -> Result<DetectionResult, DetectionError> {
        let start = Instant::now();
        let result = self.run(image, target_size);
        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &[]);

        match &result {
            Ok(result) => {
                self.metrics
                    .requests
                    .add(1, &[KeyValue::new("outcome", "ok")]);
                self.metrics
                    .detections
                    .add(result.detections.len() as u64, &[]);
                tracing::info!(
                    detections = result.detections.len(),
                    inference_ms = result.inference_ms,
                    "Detection finished"
                );
            }
            Err(e) => {
                self.metrics
                    .requests
                    .add(1, &[KeyValue::new("outcome", "error")]);
                tracing::error!(error = %e, "Detection failed");
            }
        }

        result
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }
}
