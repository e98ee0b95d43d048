//! Motion-JPEG AVI writer.
//!
//! Writes a single-stream RIFF AVI with one JPEG per `00dc` chunk and an `idx1` index.
//! The header is written up front with zero frame counts and patched on `close`, so a
//! file that was never closed still has valid chunks but reports zero frames.

use std::io::{Seek, SeekFrom, Write};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;

use super::FrameWriter;

const HEADER_LEN: u64 = 224;
const RIFF_SIZE_AT: u64 = 4;
const AVIH_TOTAL_FRAMES_AT: u64 = 48;
const AVIH_BUFFER_SIZE_AT: u64 = 60;
const STRH_LENGTH_AT: u64 = 140;
const STRH_BUFFER_SIZE_AT: u64 = 144;
const MOVI_SIZE_AT: u64 = 216;
const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

pub struct MjpegAviWriter<W: Write + Seek> {
    out: W,
    width: u32,
    height: u32,
    quality: u8,
    /// (offset relative to the `movi` tag, payload length)
    index: Vec<(u32, u32)>,
    movi_payload: u32,
    largest_chunk: u32,
    rgb: Vec<u8>,
    jpeg: Vec<u8>,
    closed: bool,
}

impl<W: Write + Seek> MjpegAviWriter<W> {
    pub fn new(mut out: W, width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(anyhow!("unsupported AVI frame size {}x{}", width, height));
        }
        let fps = fps.max(1);
        write_header(&mut out, width, height, fps).context("write AVI header")?;
        Ok(Self {
            out,
            width,
            height,
            quality: 85,
            index: Vec::new(),
            movi_payload: 0,
            largest_chunk: 0,
            rgb: Vec::new(),
            jpeg: Vec::new(),
            closed: false,
        })
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn encode(&mut self, frame: &Frame) -> Result<()> {
        self.rgb.clear();
        for px in frame.as_bytes().chunks_exact(3) {
            self.rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        self.jpeg.clear();
        JpegEncoder::new_with_quality(&mut self.jpeg, self.quality)
            .encode(&self.rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .context("encode JPEG frame")
    }

    fn write_chunk(&mut self, size: u32) -> std::io::Result<()> {
        self.out.write_all(b"00dc")?;
        self.out.write_all(&size.to_le_bytes())?;
        self.out.write_all(&self.jpeg)?;
        if size & 1 == 1 {
            self.out.write_all(&[0])?;
        }
        Ok(())
    }

    fn write_index(&mut self) -> Result<()> {
        let len = u32::try_from(self.index.len() * 16).context("AVI index too large")?;
        self.out.write_all(b"idx1")?;
        self.out.write_all(&len.to_le_bytes())?;
        for (offset, size) in &self.index {
            self.out.write_all(b"00dc")?;
            self.out.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            self.out.write_all(&offset.to_le_bytes())?;
            self.out.write_all(&size.to_le_bytes())?;
        }
        Ok(())
    }

    fn patch_u32(&mut self, at: u64, value: u32) -> Result<()> {
        self.out.seek(SeekFrom::Start(at))?;
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }
}

impl<W: Write + Seek> FrameWriter for MjpegAviWriter<W> {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("AVI writer already closed"));
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
        self.encode(frame)?;
        let size = u32::try_from(self.jpeg.len()).context("JPEG frame too large")?;
        let padded = size + (size & 1);
        let offset = 4 + self.movi_payload;
        let chunk_start = HEADER_LEN + u64::from(self.movi_payload);

        if let Err(err) = self.write_chunk(size) {
            // A partial chunk would shift every later index offset; the next chunk
            // overwrites it instead.
            self.out
                .seek(SeekFrom::Start(chunk_start))
                .context("rewind after failed AVI chunk write")?;
            return Err(err).context("write AVI chunk");
        }

        self.movi_payload = self
            .movi_payload
            .checked_add(8 + padded)
            .ok_or_else(|| anyhow!("AVI file exceeds 4 GiB"))?;
        self.largest_chunk = self.largest_chunk.max(size);
        self.index.push((offset, size));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write_index().context("write AVI index")?;
        let end = self.out.stream_position()?;
        let riff_size = u32::try_from(end - 8).context("AVI file exceeds 4 GiB")?;
        let frames = self.index.len() as u32;

        self.patch_u32(RIFF_SIZE_AT, riff_size)?;
        self.patch_u32(AVIH_TOTAL_FRAMES_AT, frames)?;
        self.patch_u32(AVIH_BUFFER_SIZE_AT, self.largest_chunk)?;
        self.patch_u32(STRH_LENGTH_AT, frames)?;
        self.patch_u32(STRH_BUFFER_SIZE_AT, self.largest_chunk)?;
        self.patch_u32(MOVI_SIZE_AT, 4 + self.movi_payload)?;
        self.out.seek(SeekFrom::Start(end))?;
        self.out.flush().context("flush AVI file")?;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.index.len() as u64
    }
}

fn write_header<W: Write>(out: &mut W, width: u32, height: u32, fps: u32) -> std::io::Result<()> {
    let mut h = Vec::with_capacity(HEADER_LEN as usize);
    let u32le = |h: &mut Vec<u8>, v: u32| h.extend_from_slice(&v.to_le_bytes());
    let u16le = |h: &mut Vec<u8>, v: u16| h.extend_from_slice(&v.to_le_bytes());

    h.extend_from_slice(b"RIFF");
    u32le(&mut h, 0);
    h.extend_from_slice(b"AVI ");

    h.extend_from_slice(b"LIST");
    u32le(&mut h, 192);
    h.extend_from_slice(b"hdrl");

    h.extend_from_slice(b"avih");
    u32le(&mut h, 56);
    u32le(&mut h, 1_000_000 / fps);
    u32le(&mut h, 0);
    u32le(&mut h, 0);
    u32le(&mut h, AVIF_HASINDEX);
    u32le(&mut h, 0); // total frames
    u32le(&mut h, 0);
    u32le(&mut h, 1);
    u32le(&mut h, 0); // suggested buffer size
    u32le(&mut h, width);
    u32le(&mut h, height);
    h.extend_from_slice(&[0u8; 16]);

    h.extend_from_slice(b"LIST");
    u32le(&mut h, 116);
    h.extend_from_slice(b"strl");

    h.extend_from_slice(b"strh");
    u32le(&mut h, 56);
    h.extend_from_slice(b"vids");
    h.extend_from_slice(b"MJPG");
    u32le(&mut h, 0);
    u16le(&mut h, 0);
    u16le(&mut h, 0);
    u32le(&mut h, 0);
    u32le(&mut h, 1); // scale
    u32le(&mut h, fps); // rate
    u32le(&mut h, 0);
    u32le(&mut h, 0); // length
    u32le(&mut h, 0); // suggested buffer size
    u32le(&mut h, u32::MAX);
    u32le(&mut h, 0);
    u16le(&mut h, 0);
    u16le(&mut h, 0);
    u16le(&mut h, width as u16);
    u16le(&mut h, height as u16);

    h.extend_from_slice(b"strf");
    u32le(&mut h, 40);
    u32le(&mut h, 40);
    u32le(&mut h, width);
    u32le(&mut h, height);
    u16le(&mut h, 1);
    u16le(&mut h, 24);
    h.extend_from_slice(b"MJPG");
    u32le(&mut h, width.saturating_mul(height).saturating_mul(3));
    h.extend_from_slice(&[0u8; 16]);

    h.extend_from_slice(b"LIST");
    u32le(&mut h, 4);
    h.extend_from_slice(b"movi");

    debug_assert_eq!(h.len() as u64, HEADER_LEN);
    out.write_all(&h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn empty_file_has_consistent_header() -> Result<()> {
        let mut writer = MjpegAviWriter::new(Cursor::new(Vec::new()), 64, 48, 30)?;
        writer.close()?;
        let bytes = writer.get_ref().get_ref();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        assert_eq!(&bytes[220..224], b"movi");
        assert_eq!(&bytes[224..228], b"idx1");
        assert_eq!(read_u32(bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(read_u32(bytes, 48), 0);
        assert_eq!(read_u32(bytes, 216), 4);
        Ok(())
    }

    #[test]
    fn frames_are_indexed_and_counted() -> Result<()> {
        let mut writer = MjpegAviWriter::new(Cursor::new(Vec::new()), 32, 24, 10)?;
        for _ in 0..3 {
            writer.write(&Frame::black(32, 24))?;
        }
        assert_eq!(writer.frames_written(), 3);
        writer.close()?;
        writer.close()?;

        let bytes = writer.get_ref().get_ref();
        assert_eq!(read_u32(bytes, 48), 3);
        assert_eq!(read_u32(bytes, 140), 3);
        assert_eq!(read_u32(bytes, 132), 10);
        assert_eq!(read_u32(bytes, 4) as usize, bytes.len() - 8);

        let movi_size = read_u32(bytes, 216) as usize;
        let idx_at = 220 + movi_size;
        assert_eq!(&bytes[idx_at..idx_at + 4], b"idx1");
        assert_eq!(read_u32(bytes, idx_at + 4), 48);

        // First index entry points at the first chunk, relative to the movi tag.
        let first_offset = read_u32(bytes, idx_at + 16) as usize;
        assert_eq!(first_offset, 4);
        assert_eq!(&bytes[220 + first_offset..224 + first_offset], b"00dc");
        let first_len = read_u32(bytes, 224 + first_offset) as usize;
        assert_eq!(&bytes[228 + first_offset..230 + first_offset], &[0xFF, 0xD8]);
        assert_eq!(read_u32(bytes, idx_at + 20) as usize, first_len);
        Ok(())
    }

    #[test]
    fn mismatched_frame_size_is_rejected() -> Result<()> {
        let mut writer = MjpegAviWriter::new(Cursor::new(Vec::new()), 32, 24, 10)?;
        assert!(writer.write(&Frame::black(16, 16)).is_err());
        assert_eq!(writer.frames_written(), 0);
        writer.write(&Frame::black(32, 24))?;
        assert_eq!(writer.frames_written(), 1);
        Ok(())
    }

    #[test]
    fn write_after_close_fails() -> Result<()> {
        let mut writer = MjpegAviWriter::new(Cursor::new(Vec::new()), 8, 8, 30)?;
        writer.close()?;
        assert!(writer.write(&Frame::black(8, 8)).is_err());
        Ok(())
    }

    /// Accepts `budget` more bytes, then fails every write until `budget` is raised.
    struct FlakyCursor {
        inner: Cursor<Vec<u8>>,
        budget: usize,
    }

    impl Write for FlakyCursor {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FlakyCursor {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn failed_chunk_write_keeps_index_aligned() -> Result<()> {
        let out = FlakyCursor {
            inner: Cursor::new(Vec::new()),
            budget: usize::MAX,
        };
        let mut writer = MjpegAviWriter::new(out, 32, 24, 10)?;
        writer.write(&Frame::black(32, 24))?;

        writer.out.budget = 20;
        assert!(writer.write(&Frame::black(32, 24)).is_err());
        assert_eq!(writer.frames_written(), 1);

        writer.out.budget = usize::MAX;
        writer.write(&Frame::black(32, 24))?;
        writer.close()?;

        let bytes = writer.get_ref().inner.get_ref();
        assert_eq!(read_u32(bytes, 48), 2);
        assert_eq!(read_u32(bytes, 4) as usize, bytes.len() - 8);
        let idx_at = 220 + read_u32(bytes, 216) as usize;
        assert_eq!(&bytes[idx_at..idx_at + 4], b"idx1");
        for entry in 0..2 {
            let at = idx_at + 8 + entry * 16;
            let offset = read_u32(bytes, at + 8) as usize;
            let len = read_u32(bytes, at + 12);
            assert_eq!(&bytes[220 + offset..224 + offset], b"00dc", "entry {}", entry);
            assert_eq!(read_u32(bytes, 224 + offset), len, "entry {}", entry);
        }
        Ok(())
    }

    #[test]
    fn largest_frame_size_does_not_overflow_header() -> Result<()> {
        let writer = MjpegAviWriter::new(Cursor::new(Vec::new()), 65_535, 65_535, 30)?;
        let bytes = writer.get_ref().get_ref();
        assert_eq!(read_u32(bytes, 176), 65_535);
        assert_eq!(read_u32(bytes, 192), u32::MAX);
        Ok(())
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(MjpegAviWriter::new(Cursor::new(Vec::new()), 0, 48, 30).is_err());
    }
}
