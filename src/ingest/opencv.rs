//! Capture devices and video files via OpenCV `VideoCapture`.

use anyhow::{anyhow, Context, Result};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use crate::cv::mat_to_frame;
use crate::frame::{CameraInfo, Frame};

use super::SourceSpec;

pub(super) struct OpenCvCapture {
    capture: VideoCapture,
}

impl OpenCvCapture {
    /// Open the device or file and apply resolution/fps hints. The device may ignore hints,
    /// so the returned info is read back from the driver.
    pub(super) fn open(spec: &SourceSpec, width: u32, height: u32, fps: u32) -> Result<(Self, CameraInfo)> {
        let mut capture = match spec {
            SourceSpec::Device(index) => VideoCapture::new(*index, videoio::CAP_ANY)
                .with_context(|| format!("open capture device {}", index))?,
            SourceSpec::File(path) => {
                let path = path
                    .to_str()
                    .ok_or_else(|| anyhow!("video path {} is not valid UTF-8", path.display()))?;
                VideoCapture::from_file(path, videoio::CAP_ANY)
                    .with_context(|| format!("open video file {}", path))?
            }
            SourceSpec::Synthetic { .. } => {
                return Err(anyhow!("synthetic sources do not use VideoCapture"))
            }
        };
        if !capture.is_opened().context("query capture state")? {
            return Err(anyhow!("could not open {}", spec));
        }

        if matches!(spec, SourceSpec::Device(_)) {
            for (prop, value, label) in [
                (videoio::CAP_PROP_FRAME_WIDTH, width, "width"),
                (videoio::CAP_PROP_FRAME_HEIGHT, height, "height"),
                (videoio::CAP_PROP_FPS, fps, "fps"),
            ] {
                if value == 0 {
                    continue;
                }
                match capture.set(prop, f64::from(value)) {
                    Ok(true) => {}
                    Ok(false) => log::debug!("CameraSource: {} ignored {} hint", spec, label),
                    Err(err) => log::warn!("CameraSource: failed to set {} on {}: {}", label, spec, err),
                }
            }
        }

        let info = CameraInfo {
            width: read_prop(&capture, videoio::CAP_PROP_FRAME_WIDTH),
            height: read_prop(&capture, videoio::CAP_PROP_FRAME_HEIGHT),
            fps: read_prop(&capture, videoio::CAP_PROP_FPS),
            fourcc: read_prop(&capture, videoio::CAP_PROP_FOURCC),
        };
        Ok((Self { capture }, info))
    }

    pub(super) fn read(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat).context("read frame")? || mat.empty() {
            return Ok(None);
        }
        mat_to_frame(&mat).map(Some)
    }

    pub(super) fn release(&mut self) {
        if let Err(err) = self.capture.release() {
            log::warn!("CameraSource: release failed: {}", err);
        }
    }
}

fn read_prop(capture: &VideoCapture, prop: i32) -> u32 {
    match capture.get(prop) {
        Ok(value) if value.is_finite() && value > 0.0 => value.round() as u32,
        _ => 0,
    }
}
