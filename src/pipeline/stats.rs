use std::time::{Duration, Instant};

use crate::detect::{DetectionGroup, DetectorKind};

/// Per-run counters. Rolling FPS is `frames / wall time since the run started`.
#[derive(Clone, Debug)]
pub struct RunStats {
    started: Instant,
    frames: u64,
    write_failures: u64,
    display_failures: u64,
    detections: Vec<(DetectorKind, u64)>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            frames: 0,
            write_failures: 0,
            display_failures: 0,
            detections: Vec::new(),
        }
    }

    pub fn record_cycle(&mut self, groups: &[DetectionGroup]) {
        self.frames += 1;
        for group in groups {
            match self.detections.iter_mut().find(|(kind, _)| *kind == group.kind) {
                Some((_, total)) => *total += group.len() as u64,
                None => self.detections.push((group.kind, group.len() as u64)),
            }
        }
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub fn record_display_failure(&mut self) {
        self.display_failures += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn display_failures(&self) -> u64 {
        self.display_failures
    }

    pub fn detections(&self) -> &[(DetectorKind, u64)] {
        &self.detections
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn fps(&self) -> f64 {
        fps(self.frames, self.elapsed())
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn fps(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        frames as f64 / secs
    }
}
