use anyhow::Result;

use crate::detect::result::{Detection, DetectorKind};
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends wrap one model (a learned object detector, a classical cascade, a test stub).
/// They may fail freely; the `Detector` adapter converts every failure into an empty
/// result before it reaches the pipeline.
pub trait DetectorBackend: Send {
    /// Backend identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Variant tag used for annotation colouring.
    fn kind(&self) -> DetectorKind;

    /// Load weights / classifier data. Called once before the first `infer`.
    fn load(&mut self) -> Result<()>;

    /// Run inference on a frame.
    ///
    /// `threshold` is a hint; backends may skip low scores early, but the adapter filters
    /// again so a backend that ignores it is still correct.
    fn infer(&mut self, frame: &Frame, threshold: f32) -> Result<Vec<Detection>>;
}
