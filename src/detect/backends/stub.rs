use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectorKind};
use crate::frame::{Frame, CHANNELS};

/// Luma at or above which a pixel counts as "bright".
const BRIGHT_LUMA: u8 = 200;
/// Minimum bright pixels before a region is reported.
const MIN_BRIGHT_PIXELS: u64 = 16;

/// Stub backend for testing and `stub://` model paths.
///
/// Reports the bounding box of all bright pixels as a single detection. Confidence grows with
/// how densely the box is filled, so a solid square scores 1.0 and scattered speckles score
/// close to 0.5. Frames without bright content (e.g. all black) yield nothing.
pub struct StubBackend {
    name: String,
    kind: DetectorKind,
    class_id: u32,
    class_name: String,
}

impl StubBackend {
    pub fn new(kind: DetectorKind, class_id: u32, class_name: &str) -> Self {
        let name = match kind {
            DetectorKind::Face => "stub-faces".to_string(),
            _ => "stub-objects".to_string(),
        };
        Self {
            name,
            kind,
            class_id,
            class_name: class_name.to_string(),
        }
    }

    pub fn objects() -> Self {
        Self::new(DetectorKind::Object, 0, "object")
    }

    pub fn faces() -> Self {
        Self::new(DetectorKind::Face, 0, "face")
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn infer(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let mut bright = 0u64;
        let (mut x1, mut y1, mut x2, mut y2) = (u32::MAX, u32::MAX, 0u32, 0u32);

        for y in 0..height {
            for x in 0..width {
                let offset = ((y as usize) * (width as usize) + x as usize) * CHANNELS;
                if frame.luma_at(offset) >= BRIGHT_LUMA {
                    bright += 1;
                    x1 = x1.min(x);
                    y1 = y1.min(y);
                    x2 = x2.max(x);
                    y2 = y2.max(y);
                }
            }
        }

        if bright < MIN_BRIGHT_PIXELS {
            return Ok(Vec::new());
        }

        let box_area = (x2 - x1 + 1) as u64 * (y2 - y1 + 1) as u64;
        let fill = bright as f32 / box_area as f32;
        let confidence = (0.5 + 0.5 * fill).min(1.0);
        if confidence < threshold {
            return Ok(Vec::new());
        }

        Ok(vec![Detection::new(
            BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
            confidence,
            self.class_id,
            self.class_name.clone(),
        )])
    }
}
