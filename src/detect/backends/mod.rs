#[cfg(feature = "opencv")]
pub mod cascade;
pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;

#[cfg(feature = "opencv")]
pub use cascade::CascadeBackend;
pub use stub::StubBackend;
#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::Result;

use crate::config::{FaceSettings, ObjectSettings};
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectorKind};
use crate::frame::Frame;

/// Build the object detector backend named by the configured model path.
///
/// `stub://...` selects the bright-region stub; anything else is an ONNX model and needs
/// the `backend-tract` feature.
pub fn object_backend(settings: &ObjectSettings) -> Result<Box<dyn DetectorBackend>> {
    if settings.model_path.starts_with("stub://") {
        return Ok(Box::new(StubBackend::objects()));
    }
    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(
            TractBackend::new(&settings.model_path).with_nms_iou(settings.nms_iou),
        ))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow::anyhow!(
            "object model {} requires the backend-tract feature",
            settings.model_path
        ))
    }
}

/// Build the face detector backend named by the configured cascade path.
pub fn face_backend(settings: &FaceSettings) -> Result<Box<dyn DetectorBackend>> {
    if settings.cascade_path.starts_with("stub://") {
        return Ok(Box::new(StubBackend::faces()));
    }
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(CascadeBackend::new(&settings.cascade_path)))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Err(anyhow::anyhow!(
            "face cascade {} requires the opencv feature",
            settings.cascade_path
        ))
    }
}

/// Stand-in for a backend that could not be constructed. It fails `load`, so the
/// pipeline treats it exactly like a model that failed to load.
pub struct UnavailableBackend {
    name: String,
    kind: DetectorKind,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(name: impl Into<String>, kind: DetectorKind, reason: &anyhow::Error) -> Self {
        Self {
            name: name.into(),
            kind,
            reason: format!("{:#}", reason),
        }
    }
}

impl DetectorBackend for UnavailableBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn load(&mut self) -> Result<()> {
        Err(anyhow::anyhow!("{}", self.reason))
    }

    fn infer(&mut self, _frame: &Frame, _threshold: f32) -> Result<Vec<Detection>> {
        Err(anyhow::anyhow!("{} is unavailable: {}", self.name, self.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::DetectorKind;

    #[test]
    fn stub_paths_select_stub_backends() {
        let object = ObjectSettings {
            model_path: "stub://objects".to_string(),
            ..ObjectSettings::default()
        };
        let face = FaceSettings {
            cascade_path: "stub://faces".to_string(),
            ..FaceSettings::default()
        };
        assert_eq!(object_backend(&object).unwrap().kind(), DetectorKind::Object);
        assert_eq!(face_backend(&face).unwrap().kind(), DetectorKind::Face);
    }

    #[test]
    fn unavailable_backend_never_loads() {
        let err = anyhow::anyhow!("requires the opencv feature");
        let mut backend = UnavailableBackend::new("haar-face", DetectorKind::Face, &err);
        let load_err = backend.load().unwrap_err();
        assert!(load_err.to_string().contains("opencv"));
        assert!(backend.infer(&Frame::black(4, 4), 0.5).is_err());
    }
}
