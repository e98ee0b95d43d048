//! Synthetic scene for `stub://` sources.
//!
//! Dark sensor noise with a bright square sweeping left to right, so the stub detectors
//! have something to find on most frames.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;

const SQUARE: u32 = 64;
const STEP: u32 = 8;
const NOISE_CEILING: u8 = 16;

pub(super) struct SyntheticScene {
    width: u32,
    height: u32,
    frame_limit: Option<u64>,
    produced: u64,
    rng: StdRng,
}

impl SyntheticScene {
    pub(super) fn new(width: u32, height: u32, frame_limit: Option<u64>) -> Self {
        Self {
            width,
            height,
            frame_limit,
            produced: 0,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub(super) fn next_frame(&mut self) -> Option<Frame> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }
        let mut frame = Frame::black(self.width, self.height);
        for byte in frame.as_bytes_mut() {
            *byte = self.rng.gen_range(0..NOISE_CEILING);
        }

        if self.width >= SQUARE && self.height >= SQUARE {
            let travel = (self.width - SQUARE).max(1) as u64;
            let left = ((self.produced * STEP as u64) % travel) as i32;
            let top = ((self.height - SQUARE) / 2) as i32;
            let size = SQUARE as i32;
            frame.fill_rect(left, top, left + size - 1, top + size - 1, [255, 255, 255]);
        }

        self.produced += 1;
        Some(frame)
    }

    #[cfg(test)]
    fn produced(&self) -> u64 {
        self.produced
    }
}
