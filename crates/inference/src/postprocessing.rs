use crate::labels::ClassNames;
use common::span_debug;
use serde::Serialize;

/// One labeled bounding box in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
    pub label: String,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Box candidate in model input space, before suppression.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
    class_id: u32,
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub class_names: ClassNames,
}

impl PostProcessor {
    pub fn new(
        confidence_threshold: f32,
        iou_threshold: f32,
        max_detections: usize,
        class_names: ClassNames,
    ) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
            class_names,
        }
    }

    /// Decode a YOLO head output into labeled detections.
    ///
    /// Accepts `[1, 4 + C, N]` (the usual export layout) as well as the
    /// transposed `[1, N, 4 + C]`. Boxes are `cx, cy, w, h` in model input
    /// pixels; the letterbox transform is undone and results are clamped to
    /// the source image.
    #[tracing::instrument(skip_all)]
    pub fn parse_detections(
        &self,
        predictions: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] != 1 {
            anyhow::bail!("Unexpected prediction shape {:?}, expected [1, 4 + C, N]", shape);
        }

        if predictions.is_empty() {
            return Ok(Vec::new());
        }

        // Anchors always outnumber classes in a YOLO head.
        let channels_first = shape[1] <= shape[2];
        let (num_channels, num_anchors) = if channels_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };

        if num_channels < 5 {
            anyhow::bail!(
                "Prediction has {} channels, need 4 box coordinates plus at least one class",
                num_channels
            );
        }

        let value = |channel: usize, anchor: usize| {
            if channels_first {
                predictions[[0, channel, anchor]]
            } else {
                predictions[[0, anchor, channel]]
            }
        };

        let mut candidates = Vec::new();

        for anchor in 0..num_anchors {
            let mut confidence = f32::NEG_INFINITY;
            let mut class_idx = 0usize;
            for c in 4..num_channels {
                let score = value(c, anchor);
                if score > confidence {
                    confidence = score;
                    class_idx = c - 4;
                }
            }

            if confidence < self.confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                value(0, anchor),
                value(1, anchor),
                value(2, anchor),
                value(3, anchor),
            );

            candidates.push(Candidate {
                x1,
                y1,
                x2,
                y2,
                confidence,
                class_id: class_idx as u32,
            });
        }

        tracing::debug!(
            anchors = num_anchors,
            candidates = candidates.len(),
            "Candidates above confidence threshold"
        );

        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        let detections = kept
            .into_iter()
            .filter_map(|candidate| self.to_source_space(&candidate, transform))
            .collect();

        Ok(detections)
    }

    /// Undo the letterbox and clamp to the source image; boxes that collapse
    /// to nothing (entirely inside the padding) are dropped.
    fn to_source_space(
        &self,
        candidate: &Candidate,
        transform: &TransformParams,
    ) -> Option<Detection> {
        let max_x = transform.orig_width as f32;
        let max_y = transform.orig_height as f32;

        let x1 = ((candidate.x1 - transform.offset_x) / transform.scale).clamp(0.0, max_x);
        let y1 = ((candidate.y1 - transform.offset_y) / transform.scale).clamp(0.0, max_y);
        let x2 = ((candidate.x2 - transform.offset_x) / transform.scale).clamp(0.0, max_x);
        let y2 = ((candidate.y2 - transform.offset_y) / transform.scale).clamp(0.0, max_y);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Detection {
            x1,
            y1,
            x2,
            y2,
            confidence: candidate.confidence,
            class_id: candidate.class_id,
            label: self.class_names.label(candidate.class_id),
        })
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first.
fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    let _s = span_debug!("nms");

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[inline]
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = inter_w * inter_h;

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
