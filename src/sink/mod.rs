//! Frame sinks: persistent video writers and interactive displays.
//!
//! - `open_video_writer` picks OpenCV's `VideoWriter` when the `opencv` feature is
//!   enabled and the built-in Motion-JPEG AVI writer otherwise.
//! - `open_display` opens a highgui window (feature: opencv).

mod avi;
#[cfg(feature = "opencv")]
mod opencv;

pub use avi::MjpegAviWriter;
#[cfg(feature = "opencv")]
pub use opencv::{HighGuiDisplay, OpenCvVideoWriter};

use std::path::Path;

use anyhow::Result;

use crate::config::{DisplaySettings, OutputSettings};
use crate::frame::{CameraInfo, Frame};

pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Key codes that stop the pipeline by default: `q`, `Q` and ESC.
pub const DEFAULT_QUIT_KEYS: [i32; 3] = [b'q' as i32, b'Q' as i32, 27];

/// A persistent destination for annotated frames.
pub trait FrameWriter {
    /// Append one frame.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the container. Idempotent.
    fn close(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;
}

/// An interactive surface: push a frame, poll an input event.
pub trait Display {
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Pending key code, masked to 8 bits, if any. Never blocks for more than a few ms.
    fn poll_key(&mut self) -> Option<i32>;

    /// Tear down the surface. Idempotent.
    fn close(&mut self);
}

/// Resolution and frame rate the writer should use for `info`, substituting defaults for
/// zero values reported by devices that do not expose them.
pub fn writer_geometry(info: &CameraInfo) -> (u32, u32, u32) {
    let (width, height) = if info.width == 0 || info.height == 0 {
        (DEFAULT_WIDTH, DEFAULT_HEIGHT)
    } else {
        (info.width, info.height)
    };
    let fps = if info.fps == 0 { DEFAULT_FPS } else { info.fps };
    (width, height, fps)
}

/// Open the video writer for `path` at the camera's effective geometry.
pub fn open_video_writer(
    path: &Path,
    info: &CameraInfo,
    settings: &OutputSettings,
) -> Result<Box<dyn FrameWriter>> {
    let (width, height, fps) = writer_geometry(info);
    if info.fps == 0 {
        log::warn!("camera reported no frame rate; writing at {} fps", fps);
    }

    #[cfg(feature = "opencv")]
    {
        let writer = OpenCvVideoWriter::open(path, &settings.fourcc, width, height, fps)?;
        log::info!(
            "writing {} ({}x{} @ {} fps, {})",
            path.display(),
            width,
            height,
            fps,
            settings.fourcc
        );
        Ok(Box::new(writer))
    }

    #[cfg(not(feature = "opencv"))]
    {
        use anyhow::Context;

        if !settings.fourcc.eq_ignore_ascii_case("MJPG") {
            log::info!(
                "codec {} needs the opencv feature; writing Motion-JPEG instead",
                settings.fourcc
            );
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("create output file {}", path.display()))?;
        let writer = MjpegAviWriter::new(std::io::BufWriter::new(file), width, height, fps)?;
        log::info!(
            "writing {} ({}x{} @ {} fps, MJPG)",
            path.display(),
            width,
            height,
            fps
        );
        Ok(Box::new(writer))
    }
}

/// Open the interactive display window.
pub fn open_display(settings: &DisplaySettings) -> Result<Box<dyn Display>> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(HighGuiDisplay::open(&settings.window_name)?))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Err(anyhow::anyhow!(
            "display window {:?} requires the opencv feature",
            settings.window_name
        ))
    }
}
