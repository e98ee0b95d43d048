//! Camera frame source.
//!
//! `CameraSource` wraps a capture device, a video file, or a synthetic `stub://` scene
//! behind one lifecycle. Real devices and files require the `opencv` feature; synthetic
//! scenes are always available.

use anyhow::{anyhow, Result};

use crate::frame::{CameraInfo, Frame};

#[cfg(feature = "opencv")]
use super::opencv::OpenCvCapture;
use super::synthetic::SyntheticScene;
use super::{FrameSource, SourceSpec};

const SYNTHETIC_FOURCC: &str = "BGR3";

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub source: SourceSpec,
    /// Requested frame width. Devices may ignore it.
    pub width: u32,
    /// Requested frame height. Devices may ignore it.
    pub height: u32,
    /// Requested frame rate. Devices may ignore it.
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::Device(0),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

pub struct CameraSource {
    config: CameraConfig,
    backend: CameraBackend,
    info: CameraInfo,
    frames_read: u64,
}

enum CameraBackend {
    Closed,
    Synthetic(SyntheticScene),
    #[cfg(feature = "opencv")]
    Device(OpenCvCapture),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            backend: CameraBackend::Closed,
            info: CameraInfo::default(),
            frames_read: 0,
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.backend, CameraBackend::Closed)
    }

    fn open_synthetic(&self, frame_limit: Option<u64>) -> Result<(CameraBackend, CameraInfo)> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic source needs non-zero dimensions, got {}x{}",
                self.config.width,
                self.config.height
            ));
        }
        let info = CameraInfo {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
            fourcc: crate::frame::fourcc(SYNTHETIC_FOURCC)?,
        };
        let scene = SyntheticScene::new(info.width, info.height, frame_limit);
        Ok((CameraBackend::Synthetic(scene), info))
    }

    #[cfg(feature = "opencv")]
    fn open_device(&self) -> Result<(CameraBackend, CameraInfo)> {
        let (capture, info) = OpenCvCapture::open(
            &self.config.source,
            self.config.width,
            self.config.height,
            self.config.fps,
        )?;
        Ok((CameraBackend::Device(capture), info))
    }

    #[cfg(not(feature = "opencv"))]
    fn open_device(&self) -> Result<(CameraBackend, CameraInfo)> {
        Err(anyhow!(
            "{} requires the opencv feature; only stub:// sources are available",
            self.config.source
        ))
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> String {
        self.config.source.to_string()
    }

    fn initialize(&mut self) -> Result<CameraInfo> {
        if self.is_open() {
            self.release();
        }
        let (backend, info) = match &self.config.source {
            SourceSpec::Synthetic { frame_limit, .. } => self.open_synthetic(*frame_limit)?,
            SourceSpec::Device(_) | SourceSpec::File(_) => self.open_device()?,
        };
        self.backend = backend;
        self.info = info;
        self.frames_read = 0;
        log::info!(
            "CameraSource: opened {} ({}x{} @ {} fps, fourcc {})",
            self.config.source,
            info.width,
            info.height,
            info.fps,
            crate::frame::fourcc_to_string(info.fourcc)
        );
        if (info.width, info.height) != (self.config.width, self.config.height) {
            log::debug!(
                "CameraSource: requested {}x{}, device chose {}x{}",
                self.config.width,
                self.config.height,
                info.width,
                info.height
            );
        }
        Ok(info)
    }

    fn read(&mut self) -> Option<Frame> {
        let frame = match &mut self.backend {
            CameraBackend::Closed => return None,
            CameraBackend::Synthetic(scene) => scene.next_frame(),
            #[cfg(feature = "opencv")]
            CameraBackend::Device(capture) => match capture.read() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("CameraSource: read from {} failed: {:#}", self.config.source, err);
                    None
                }
            },
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        frame
    }

    fn release(&mut self) {
        match std::mem::replace(&mut self.backend, CameraBackend::Closed) {
            CameraBackend::Closed => return,
            CameraBackend::Synthetic(_) => {}
            #[cfg(feature = "opencv")]
            CameraBackend::Device(mut capture) => capture.release(),
        }
        log::info!(
            "CameraSource: released {} after {} frames",
            self.config.source,
            self.frames_read
        );
    }

    fn info(&self) -> CameraInfo {
        self.info
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(frames: Option<u64>) -> CameraConfig {
        CameraConfig {
            source: SourceSpec::Synthetic {
                name: "test".to_string(),
                frame_limit: frames,
            },
            width: 320,
            height: 240,
            fps: 15,
        }
    }

    #[test]
    fn read_before_initialize_is_none() {
        let mut source = CameraSource::new(stub_config(None));
        assert!(source.read().is_none());
        assert!(source.info().is_zero());
    }

    #[test]
    fn initialize_reports_effective_info() -> Result<()> {
        let mut source = CameraSource::new(stub_config(None));
        let info = source.initialize()?;
        assert_eq!((info.width, info.height, info.fps), (320, 240, 15));
        assert_eq!(source.info(), info);
        let frame = source.read().expect("frame");
        assert_eq!(frame.dimensions(), (320, 240));
        Ok(())
    }

    #[test]
    fn release_is_idempotent_and_stops_reads() -> Result<()> {
        let mut source = CameraSource::new(stub_config(None));
        source.initialize()?;
        source.release();
        source.release();
        assert!(!source.is_open());
        assert!(source.read().is_none());
        Ok(())
    }

    #[test]
    fn frame_limit_ends_stream() -> Result<()> {
        let mut source = CameraSource::new(stub_config(Some(2)));
        source.initialize()?;
        assert!(source.read().is_some());
        assert!(source.read().is_some());
        assert!(source.read().is_none());
        assert_eq!(source.frames_read(), 2);
        Ok(())
    }

    #[test]
    fn release_on_uninitialized_source_is_safe() {
        let mut source = CameraSource::new(CameraConfig::default());
        source.release();
        assert!(source.info().is_zero());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn device_without_opencv_fails_to_initialize() {
        let mut source = CameraSource::new(CameraConfig::default());
        let err = source.initialize().unwrap_err();
        assert!(err.to_string().contains("opencv"));
        assert!(source.info().is_zero());
        assert!(source.read().is_none());
    }
}
