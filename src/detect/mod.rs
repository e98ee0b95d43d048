mod backend;
pub mod backends;
pub mod coco;
mod detector;
mod result;

pub use backend::DetectorBackend;
pub use backends::{face_backend, object_backend, StubBackend, UnavailableBackend};
pub use detector::Detector;
pub use result::{BoundingBox, Detection, DetectionGroup, DetectorKind};
