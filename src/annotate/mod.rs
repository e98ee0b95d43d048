//! Frame annotation: bounding boxes, labels and the statistics overlay.
//!
//! Drawing is clipped to the frame and never changes its dimensions. Boxes that are
//! degenerate or entirely off-frame are skipped rather than failing the cycle. A panic
//! while drawing one detection costs only that detection; the overlay pass is isolated
//! the same way.

mod font;

use std::panic::{self, AssertUnwindSafe};

pub use font::{draw_text, text_height, text_width};

use crate::detect::{Detection, DetectionGroup, DetectorKind};
use crate::frame::{Bgr, Frame};

const WHITE: Bgr = [255, 255, 255];
const LABEL_PADDING: i32 = 3;
const QUIT_HINT: &str = "Press Q to quit";

/// What to draw beyond the detections themselves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayOptions {
    /// Per-detector-kind counts in the top-left corner.
    pub stats: bool,
    /// Quit-key hint along the bottom edge (only useful with a display).
    pub quit_hint: bool,
}

#[derive(Clone, Debug)]
pub struct Annotator {
    box_thickness: i32,
    label_scale: i32,
    overlay_scale: i32,
    overlay: OverlayOptions,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            box_thickness: 2,
            label_scale: 1,
            overlay_scale: 2,
            overlay: OverlayOptions::default(),
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overlay(mut self, overlay: OverlayOptions) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_box_thickness(mut self, thickness: i32) -> Self {
        self.box_thickness = thickness.max(1);
        self
    }

    pub fn overlay(&self) -> OverlayOptions {
        self.overlay
    }

    /// Burn boxes and labels for every group into the frame and hand it back.
    pub fn draw(&self, mut frame: Frame, groups: &[DetectionGroup]) -> Frame {
        self.draw_in_place(&mut frame, groups);
        frame
    }

    pub fn draw_in_place(&self, frame: &mut Frame, groups: &[DetectionGroup]) {
        for group in groups {
            for detection in &group.detections {
                let drawn = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.draw_detection(frame, detection, group.kind)
                }));
                if drawn.is_err() {
                    log::error!(
                        "annotation of {} panicked; leaving it undrawn",
                        detection.label()
                    );
                }
            }
        }
        let drawn = panic::catch_unwind(AssertUnwindSafe(|| self.draw_overlay(frame, groups)));
        if drawn.is_err() {
            log::error!("statistics overlay panicked; frame keeps its detections only");
        }
    }

    fn draw_overlay(&self, frame: &mut Frame, groups: &[DetectionGroup]) {
        if self.overlay.stats {
            self.draw_stats(frame, groups);
        }
        if self.overlay.quit_hint {
            let y = frame.height() as i32 - text_height(self.overlay_scale) - 10;
            draw_text(frame, 10, y, QUIT_HINT, WHITE, self.overlay_scale);
        }
    }

    fn draw_detection(&self, frame: &mut Frame, detection: &Detection, kind: DetectorKind) {
        #[cfg(test)]
        if detection.class_name == tests::UNDRAWABLE {
            panic!("undrawable detection");
        }
        let Some(bbox) = detection.bbox.clamp_to(frame.width(), frame.height()) else {
            log::debug!("skipping off-frame box for {}", detection.class_name);
            return;
        };
        let color = kind.color();
        let t = self.box_thickness - 1;
        frame.fill_rect(bbox.x1, bbox.y1, bbox.x2, bbox.y1 + t, color);
        frame.fill_rect(bbox.x1, bbox.y2 - t, bbox.x2, bbox.y2, color);
        frame.fill_rect(bbox.x1, bbox.y1, bbox.x1 + t, bbox.y2, color);
        frame.fill_rect(bbox.x2 - t, bbox.y1, bbox.x2, bbox.y2, color);

        let label = detection.label();
        let label_w = text_width(&label, self.label_scale);
        let label_h = text_height(self.label_scale) + 2 * LABEL_PADDING;
        // Above the box when there is room, otherwise just inside its top edge.
        let top = if bbox.y1 - label_h >= 0 {
            bbox.y1 - label_h
        } else {
            bbox.y1
        };
        frame.fill_rect(
            bbox.x1,
            top,
            bbox.x1 + label_w + 2 * LABEL_PADDING - 1,
            top + label_h - 1,
            color,
        );
        draw_text(
            frame,
            bbox.x1 + LABEL_PADDING,
            top + LABEL_PADDING,
            &label,
            kind.text_color(),
            self.label_scale,
        );
    }

    fn draw_stats(&self, frame: &mut Frame, groups: &[DetectionGroup]) {
        let line_h = text_height(self.overlay_scale) + 8;
        for (row, (kind, count)) in count_by_kind(groups).into_iter().enumerate() {
            let text = format!("{}: {}", kind.label(), count);
            let y = 10 + row as i32 * line_h;
            draw_text(frame, 10, y, &text, kind.color(), self.overlay_scale);
        }
    }
}

/// Detection totals per kind, in order of first appearance.
pub fn count_by_kind(groups: &[DetectionGroup]) -> Vec<(DetectorKind, usize)> {
    let mut counts: Vec<(DetectorKind, usize)> = Vec::new();
    for group in groups {
        match counts.iter_mut().find(|(kind, _)| *kind == group.kind) {
            Some((_, count)) => *count += group.len(),
            None => counts.push((group.kind, group.len())),
        }
    }
    counts
}
