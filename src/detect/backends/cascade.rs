#![cfg(feature = "opencv")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use opencv::{
    core::{Mat, Rect, Size, Vector},
    imgproc,
    objdetect::{self, CascadeClassifier},
    prelude::*,
};

use crate::cv::frame_to_mat;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectorKind};
use crate::frame::Frame;

/// Haar cascades report no score; every hit gets this confidence.
const CASCADE_CONFIDENCE: f32 = 0.9;

/// Haar-cascade frontal face detector.
pub struct CascadeBackend {
    cascade_path: PathBuf,
    classifier: Option<CascadeClassifier>,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: i32,
}

impl CascadeBackend {
    pub fn new<P: AsRef<Path>>(cascade_path: P) -> Self {
        Self {
            cascade_path: cascade_path.as_ref().to_path_buf(),
            classifier: None,
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: 30,
        }
    }
}

impl DetectorBackend for CascadeBackend {
    fn name(&self) -> &str {
        "haar-face"
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Face
    }

    fn load(&mut self) -> Result<()> {
        if self.classifier.is_some() {
            return Ok(());
        }
        let path = self
            .cascade_path
            .to_str()
            .ok_or_else(|| anyhow!("cascade path is not valid UTF-8"))?;
        let classifier = CascadeClassifier::new(path)
            .with_context(|| format!("failed to open cascade {}", self.cascade_path.display()))?;
        if classifier.empty()? {
            return Err(anyhow!(
                "could not load face cascade classifier from {}",
                self.cascade_path.display()
            ));
        }
        self.classifier = Some(classifier);
        Ok(())
    }

    fn infer(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<Detection>> {
        let classifier = self
            .classifier
            .as_mut()
            .ok_or_else(|| anyhow!("cascade not loaded"))?;
        if CASCADE_CONFIDENCE < threshold {
            return Ok(Vec::new());
        }

        let bgr = frame_to_mat(frame)?;
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY)
            .context("grayscale conversion failed")?;

        let mut faces = Vector::<Rect>::new();
        classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                self.scale_factor,
                self.min_neighbors,
                objdetect::CASCADE_SCALE_IMAGE,
                Size::new(self.min_size, self.min_size),
                Size::new(0, 0),
            )
            .context("detectMultiScale failed")?;

        Ok(faces
            .iter()
            .map(|r| {
                Detection::new(
                    BoundingBox::from_xywh(r.x, r.y, r.width, r.height),
                    CASCADE_CONFIDENCE,
                    0,
                    "face",
                )
            })
            .collect())
    }
}
