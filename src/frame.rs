//! Frame and camera metadata types.
//!
//! - `Frame`: owned BGR8 pixel buffer for one pipeline cycle.
//! - `CameraInfo`: effective capture properties queried after device initialization.
//!
//! A frame is a value owned by the cycle that read it. Stages that only look at pixels
//! (detectors) receive `&Frame`; stages that draw (annotator) receive `&mut Frame` or take
//! the frame by value and hand it forward.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Number of interleaved channels per pixel (B, G, R).
pub const CHANNELS: usize = 3;

/// A BGR colour triple.
pub type Bgr = [u8; 3];

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image: `height × width × 3` bytes in BGR order, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap a BGR8 buffer. The buffer length must be exactly `width * height * 3`.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} BGR bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// All-zero frame.
    pub fn black(width: u32, height: u32) -> Self {
        let len = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(CHANNELS);
        Self {
            data: vec![0u8; len],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// BGR value at `(x, y)`, or `None` when outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Bgr> {
        let offset = self.offset(x as i64, y as i64)?;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Set one pixel. Coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i32, y: i32, color: Bgr) {
        if let Some(offset) = self.offset(x as i64, y as i64) {
            self.data[offset..offset + CHANNELS].copy_from_slice(&color);
        }
    }

    /// Fill the inclusive rectangle `(left, top)..=(right, bottom)`, clipped to the frame.
    pub fn fill_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32, color: Bgr) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let max_x = self.width as i32 - 1;
        let max_y = self.height as i32 - 1;
        if right < 0 || bottom < 0 || left > max_x || top > max_y {
            return;
        }
        let left = left.clamp(0, max_x);
        let right = right.clamp(0, max_x);
        let top = top.clamp(0, max_y);
        let bottom = bottom.clamp(0, max_y);
        for y in top..=bottom {
            for x in left..=right {
                self.put_pixel(x, y, color);
            }
        }
    }

    /// Rec. 601 luma of the pixel at a byte offset.
    pub(crate) fn luma_at(&self, offset: usize) -> u8 {
        let b = self.data[offset] as u32;
        let g = self.data[offset + 1] as u32;
        let r = self.data[offset + 2] as u32;
        ((299 * r + 587 * g + 114 * b) / 1000) as u8
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(((y as usize) * (self.width as usize) + x as usize) * CHANNELS)
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// CameraInfo
// ----------------------------------------------------------------------------

/// Effective capture properties. The default value is the "not initialized" zero value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fourcc: u32,
}

impl CameraInfo {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Pack a four character code (e.g. "XVID") into its little-endian integer form.
pub fn fourcc(code: &str) -> Result<u32> {
    let bytes = code.as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return Err(anyhow!("fourcc must be four printable ASCII characters, got {:?}", code));
    }
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Render a packed four character code; non-printable codes render as hex.
pub fn fourcc_to_string(code: u32) -> String {
    let bytes = code.to_le_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        bytes.iter().map(|b| *b as char).collect()
    } else {
        format!("0x{:08x}", code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bgr_validates_length() {
        assert!(Frame::from_bgr(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_bgr(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::black(4, 3);
        frame.put_pixel(-1, 0, [1, 2, 3]);
        frame.put_pixel(4, 0, [1, 2, 3]);
        frame.put_pixel(0, 3, [1, 2, 3]);
        assert!(frame.as_bytes().iter().all(|b| *b == 0));

        frame.put_pixel(3, 2, [1, 2, 3]);
        assert_eq!(frame.pixel(3, 2), Some([1, 2, 3]));
        assert_eq!(frame.pixel(4, 2), None);
    }

    #[test]
    fn fill_rect_clips_to_frame() {
        let mut frame = Frame::black(4, 4);
        frame.fill_rect(-10, -10, 1, 1, [9, 9, 9]);
        assert_eq!(frame.pixel(0, 0), Some([9, 9, 9]));
        assert_eq!(frame.pixel(1, 1), Some([9, 9, 9]));
        assert_eq!(frame.pixel(2, 2), Some([0, 0, 0]));

        let before = frame.clone();
        frame.fill_rect(10, 10, 20, 20, [1, 1, 1]);
        assert_eq!(frame, before);
    }

    #[test]
    fn fourcc_round_trips_printable_codes() {
        let code = fourcc("XVID").unwrap();
        assert_eq!(fourcc_to_string(code), "XVID");
        assert!(fourcc("XV").is_err());
        assert_eq!(fourcc_to_string(0), "0x00000000");
    }

    #[test]
    fn camera_info_default_is_zero() {
        assert!(CameraInfo::default().is_zero());
    }
}
