//! Frame sources.
//!
//! This module provides the sources the pipeline pulls frames from:
//! - Local capture devices by index (feature: opencv)
//! - Local video files (feature: opencv)
//! - Synthetic `stub://` scenes (always available, used by tests and demos)
//!
//! Every source follows the same lifecycle: `initialize` opens the device and records the
//! effective `CameraInfo`, `read` blocks for the next frame, `release` closes the device and
//! may be called any number of times. A failed read and an ended stream look the same to
//! callers: `read` returns `None`.

mod camera;
#[cfg(feature = "opencv")]
mod opencv;
mod synthetic;

pub use camera::{CameraConfig, CameraSource};

use std::path::PathBuf;

use anyhow::Result;

use crate::frame::{CameraInfo, Frame};

/// A producer of frames with an explicit device lifecycle.
pub trait FrameSource {
    /// Human readable source description for logs.
    fn name(&self) -> String;

    /// Open the device and apply capture hints. Returns the effective camera properties.
    fn initialize(&mut self) -> Result<CameraInfo>;

    /// Next frame, or `None` on read failure, end-of-stream, or when not initialized.
    fn read(&mut self) -> Option<Frame>;

    /// Close the device. Idempotent; safe on a source that never initialized.
    fn release(&mut self);

    /// Effective camera properties; the zero value before a successful `initialize`.
    fn info(&self) -> CameraInfo;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn initialize(&mut self) -> Result<CameraInfo> {
        (**self).initialize()
    }

    fn read(&mut self) -> Option<Frame> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn info(&self) -> CameraInfo {
        (**self).info()
    }
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Capture device index (0 is the default camera).
    Device(i32),
    /// Local video file.
    File(PathBuf),
    /// Synthetic scene; `frame_limit` ends the stream after that many frames.
    Synthetic {
        name: String,
        frame_limit: Option<u64>,
    },
}

impl SourceSpec {
    /// Parse `"0"`, `"stub://name?frames=N"`, or a file path.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("video source must not be empty");
        }
        if let Some(rest) = raw.strip_prefix("stub://") {
            let (name, query) = match rest.split_once('?') {
                Some((name, query)) => (name, Some(query)),
                None => (rest, None),
            };
            let mut frame_limit = None;
            for pair in query.into_iter().flat_map(|q| q.split('&')) {
                match pair.split_once('=') {
                    Some(("frames", value)) => {
                        let limit: u64 = value.parse().map_err(|_| {
                            anyhow::anyhow!("stub source frames must be an integer, got {:?}", value)
                        })?;
                        frame_limit = Some(limit);
                    }
                    _ => anyhow::bail!("unknown stub source option {:?}", pair),
                }
            }
            return Ok(SourceSpec::Synthetic {
                name: name.to_string(),
                frame_limit,
            });
        }
        if let Ok(index) = raw.parse::<i32>() {
            return Ok(SourceSpec::Device(index));
        }
        if let Some(index) = raw
            .strip_prefix("/dev/video")
            .and_then(|digits| digits.parse::<i32>().ok())
        {
            return Ok(SourceSpec::Device(index));
        }
        if raw.contains("://") {
            anyhow::bail!("video source only supports local devices, files and stub:// scenes");
        }
        Ok(SourceSpec::File(PathBuf::from(raw)))
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "camera {}", index),
            SourceSpec::File(path) => write!(f, "file {}", path.display()),
            SourceSpec::Synthetic { name, .. } => write!(f, "stub://{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_indices() {
        assert_eq!(SourceSpec::parse("0").unwrap(), SourceSpec::Device(0));
        assert_eq!(SourceSpec::parse("/dev/video2").unwrap(), SourceSpec::Device(2));
    }

    #[test]
    fn parses_stub_with_frame_limit() {
        assert_eq!(
            SourceSpec::parse("stub://hallway?frames=50").unwrap(),
            SourceSpec::Synthetic {
                name: "hallway".to_string(),
                frame_limit: Some(50)
            }
        );
        assert!(SourceSpec::parse("stub://x?frames=lots").is_err());
        assert!(SourceSpec::parse("stub://x?speed=2").is_err());
    }

    #[test]
    fn rejects_remote_urls_and_accepts_paths() {
        assert!(SourceSpec::parse("rtsp://camera/stream").is_err());
        assert!(SourceSpec::parse("   ").is_err());
        assert_eq!(
            SourceSpec::parse("clips/hall.mp4").unwrap(),
            SourceSpec::File(PathBuf::from("clips/hall.mp4"))
        );
    }
}
