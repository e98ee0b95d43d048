use serde::Serialize;

use crate::frame::Bgr;

/// Axis-aligned box in pixel coordinates. Always normalized so `x1 <= x2` and `y1 <= y2`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Box from a top-left corner and size.
    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x.saturating_add(w), y.saturating_add(h))
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }
        let inter = (ix2 - ix1) as i64 * (iy2 - iy1) as i64;
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }

    /// Clamp to a `width × height` frame. Returns `None` when nothing of the box remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = width as i32 - 1;
        let max_y = height as i32 - 1;
        // Fields are public, so a literal may arrive with its corners swapped.
        let b = BoundingBox::new(self.x1, self.y1, self.x2, self.y2);
        if b.x2 < 0 || b.y2 < 0 || b.x1 > max_x || b.y1 > max_y {
            return None;
        }
        Some(BoundingBox {
            x1: b.x1.clamp(0, max_x),
            y1: b.y1.clamp(0, max_y),
            x2: b.x2.clamp(0, max_x),
            y2: b.y2.clamp(0, max_y),
        })
    }
}

/// One detector result for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    pub class_id: u32,
    pub class_name: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: u32, class_name: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.into(),
        }
    }

    /// Overlay label, e.g. `"person: 0.87"`.
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.class_name, self.confidence)
    }
}

/// Detector variant tag. Drives annotation colours and statistics labels.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DetectorKind {
    Object,
    Face,
}

impl DetectorKind {
    /// Box and label background colour (BGR).
    pub fn color(self) -> Bgr {
        match self {
            DetectorKind::Object => [0, 255, 0],
            DetectorKind::Face => [255, 0, 0],
        }
    }

    /// Label text colour (BGR).
    pub fn text_color(self) -> Bgr {
        match self {
            DetectorKind::Object => [0, 0, 0],
            DetectorKind::Face => [255, 255, 255],
        }
    }

    /// Plural label used by the statistics overlay and logs.
    pub fn label(self) -> &'static str {
        match self {
            DetectorKind::Object => "Objects",
            DetectorKind::Face => "Faces",
        }
    }
}

/// Output of one detector for one cycle.
#[derive(Clone, Debug)]
pub struct DetectionGroup {
    pub kind: DetectorKind,
    pub detections: Vec<Detection>,
}

impl DetectionGroup {
    pub fn new(kind: DetectorKind, detections: Vec<Detection>) -> Self {
        Self { kind, detections }
    }

    pub fn empty(kind: DetectorKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_normalizes_corners() {
        let bbox = BoundingBox::new(10, 20, 2, 4);
        assert_eq!(bbox, BoundingBox { x1: 2, y1: 4, x2: 10, y2: 20 });
        assert_eq!(bbox.width(), 8);
        assert_eq!(bbox.height(), 16);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 20, 30, 30);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
        let half = BoundingBox::new(5, 0, 15, 10);
        assert!((a.iou(&half) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn clamp_drops_off_frame_boxes() {
        let inside = BoundingBox::new(-5, -5, 700, 500).clamp_to(640, 480).unwrap();
        assert_eq!(inside, BoundingBox::new(0, 0, 639, 479));
        assert!(BoundingBox::new(700, 10, 800, 20).clamp_to(640, 480).is_none());
    }

    #[test]
    fn clamp_normalizes_swapped_literal() {
        let swapped = BoundingBox {
            x1: 50,
            y1: 40,
            x2: 10,
            y2: -5,
        };
        assert_eq!(swapped.clamp_to(32, 32), Some(BoundingBox::new(10, 0, 31, 31)));
    }

    #[test]
    fn label_uses_two_decimals() {
        let det = Detection::new(BoundingBox::new(0, 0, 1, 1), 0.876, 0, "person");
        assert_eq!(det.label(), "person: 0.88");
    }
}
