#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::coco;
use crate::detect::result::{BoundingBox, Detection, DetectorKind};
use crate::frame::{Frame, CHANNELS};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// YOLOv8 input edge length.
pub const DEFAULT_INPUT_SIZE: u32 = 640;
const MAX_DETECTIONS: usize = 100;

/// Tract-based YOLOv8 object detector.
///
/// Loads a local ONNX export (`yolov8n.onnx` and friends). Frames are resized to the model
/// input, inferred, decoded from the `[1, 4 + classes, anchors]` output, suppressed per class
/// and scaled back to frame pixels.
pub struct TractBackend {
    model_path: PathBuf,
    name: String,
    model: Option<Plan>,
    input_size: u32,
    nms_iou: f32,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        let model_path = model_path.as_ref().to_path_buf();
        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());
        Self {
            model_path,
            name,
            model: None,
            input_size: DEFAULT_INPUT_SIZE,
            nms_iou: 0.45,
        }
    }

    /// Override the IoU above which same-class boxes are suppressed.
    pub fn with_nms_iou(mut self, iou: f32) -> Self {
        self.nms_iou = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let (src_w, src_h) = frame.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let size = self.input_size as usize;
        let pixels = frame.as_bytes();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            // Nearest-neighbour resize; BGR storage to RGB tensor.
            let sx = x * src_w as usize / size;
            let sy = y * src_h as usize / size;
            let idx = (sy * src_w as usize + sx) * CHANNELS + (2 - channel);
            pixels[idx] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame, threshold: f32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("expected a rank-3 YOLO output")?;

        let (_, d1, d2) = view.dim();
        // Exports differ on whether anchors or attributes come first.
        let channel_major = d1 < d2;
        let (attrs, anchors) = if channel_major { (d1, d2) } else { (d2, d1) };
        if attrs <= 4 {
            return Err(anyhow!("YOLO output has {} attributes, expected > 4", attrs));
        }
        let at = |attr: usize, anchor: usize| {
            if channel_major {
                view[[0, attr, anchor]]
            } else {
                view[[0, anchor, attr]]
            }
        };

        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..attrs)
                .map(|attr| (attr - 4, at(attr, anchor)))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < threshold {
                continue;
            }
            let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) * scale_x).round() as i32,
                ((cy - h / 2.0) * scale_y).round() as i32,
                ((cx + w / 2.0) * scale_x).round() as i32,
                ((cy + h / 2.0) * scale_y).round() as i32,
            );
            candidates.push(Detection::new(
                bbox,
                score.min(1.0),
                class_id as u32,
                coco::class_name(class_id as u32),
            ));
        }

        Ok(non_max_suppression(candidates, self.nms_iou, MAX_DETECTIONS))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Object
    }

    fn load(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        let size = self.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!("failed to load ONNX model from {}", self.model_path.display())
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.model = Some(model);
        Ok(())
    }

    fn infer(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<Detection>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("model not loaded"))?;
        let input = self.build_input(frame)?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, threshold)
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub(crate) fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    limit: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        if keep.len() >= limit {
            break;
        }
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_best_of_overlapping_same_class() {
        let dets = vec![
            Detection::new(BoundingBox::new(0, 0, 100, 100), 0.6, 0, "person"),
            Detection::new(BoundingBox::new(2, 2, 102, 102), 0.9, 0, "person"),
            Detection::new(BoundingBox::new(2, 2, 102, 102), 0.7, 2, "car"),
        ];
        let kept = non_max_suppression(dets, 0.45, 100);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_name, "car");
    }

    #[test]
    fn missing_model_fails_to_load() {
        let mut backend = TractBackend::new("/nonexistent/yolov8n.onnx");
        assert!(backend.load().is_err());
        assert_eq!(backend.name(), "yolov8n");
    }
}
