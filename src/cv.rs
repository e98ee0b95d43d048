#![cfg(feature = "opencv")]

//! Conversions between `Frame` and OpenCV `Mat`.

use anyhow::{anyhow, Context, Result};
use opencv::{core::Mat, prelude::*};

use crate::frame::Frame;

/// Copy a frame into an owned 8UC3 `Mat`.
pub(crate) fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    let flat = Mat::from_slice(frame.as_bytes()).context("failed to wrap frame bytes")?;
    let shaped = flat
        .reshape(3, frame.height() as i32)
        .context("failed to reshape frame into BGR matrix")?;
    shaped.try_clone().context("failed to copy frame matrix")
}

/// Copy an 8UC3 `Mat` into a frame.
pub(crate) fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    let size = mat.size().context("failed to query frame size")?;
    if size.width <= 0 || size.height <= 0 {
        return Err(anyhow!("captured frame is empty"));
    }
    if mat.channels() != 3 {
        return Err(anyhow!("expected 3-channel BGR frame, got {} channels", mat.channels()));
    }
    let bytes = if mat.is_continuous() {
        mat.data_bytes().context("failed to read frame bytes")?.to_vec()
    } else {
        let copy = mat.try_clone().context("failed to copy strided frame")?;
        copy.data_bytes().context("failed to read frame bytes")?.to_vec()
    };
    Frame::from_bgr(bytes, size.width as u32, size.height as u32)
}
