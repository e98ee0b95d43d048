//! OpenCV sinks: `VideoWriter` for files and a highgui window for interactive display.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use opencv::core::Size;
use opencv::prelude::*;
use opencv::{highgui, videoio};

use crate::cv::frame_to_mat;
use crate::frame::Frame;

use super::{Display, FrameWriter};

pub struct OpenCvVideoWriter {
    writer: videoio::VideoWriter,
    width: u32,
    height: u32,
    frames: u64,
    closed: bool,
}

impl OpenCvVideoWriter {
    pub fn open(path: &Path, fourcc: &str, width: u32, height: u32, fps: u32) -> Result<Self> {
        let chars: Vec<char> = fourcc.chars().collect();
        let [a, b, c, d] = chars[..] else {
            return Err(anyhow!("fourcc must be four characters, got {:?}", fourcc));
        };
        let code = videoio::VideoWriter::fourcc(a, b, c, d).context("pack fourcc")?;
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("output path {} is not valid UTF-8", path.display()))?;
        let writer = videoio::VideoWriter::new(
            path_str,
            code,
            f64::from(fps),
            Size::new(width as i32, height as i32),
            true,
        )
        .with_context(|| format!("create video writer {}", path.display()))?;
        if !writer.is_opened().context("query video writer state")? {
            return Err(anyhow!(
                "could not open {} for writing with codec {}",
                path.display(),
                fourcc
            ));
        }
        Ok(Self {
            writer,
            width,
            height,
            frames: 0,
            closed: false,
        })
    }
}

impl FrameWriter for OpenCvVideoWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("video writer already closed"));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        let mat = frame_to_mat(frame)?;
        self.writer.write(&mat).context("write video frame")?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.release().context("release video writer")
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

pub struct HighGuiDisplay {
    window: String,
    open: bool,
}

impl HighGuiDisplay {
    pub fn open(window: &str) -> Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("open display window {:?}", window))?;
        Ok(Self {
            window: window.to_string(),
            open: true,
        })
    }
}

impl Display for HighGuiDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        if !self.open {
            return Err(anyhow!("display window closed"));
        }
        let mat = frame_to_mat(frame)?;
        highgui::imshow(&self.window, &mat).context("show frame")
    }

    fn poll_key(&mut self) -> Option<i32> {
        if !self.open {
            return None;
        }
        match highgui::wait_key(1) {
            Ok(key) if key >= 0 => Some(key & 0xFF),
            Ok(_) => None,
            Err(err) => {
                log::warn!("Display: key poll failed: {}", err);
                None
            }
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(err) = highgui::destroy_window(&self.window) {
            log::warn!("Display: failed to destroy window {:?}: {}", self.window, err);
        }
    }
}
