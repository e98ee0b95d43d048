use std::panic::{self, AssertUnwindSafe};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectorKind};
use crate::frame::Frame;

/// Pipeline-facing detector: a backend plus threshold, sampling cadence and failure
/// isolation.
///
/// `load` reports success as a boolean and `detect` always yields a list. Backend errors
/// and panics are logged and become "no detections", so one bad frame cannot halt a run.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
    threshold: f32,
    every_n: u64,
    loaded: bool,
    invocations: u64,
    failures: u64,
}

impl Detector {
    pub fn new<B: DetectorBackend + 'static>(backend: B, threshold: f32) -> Self {
        Self::from_boxed(Box::new(backend), threshold)
    }

    pub fn from_boxed(backend: Box<dyn DetectorBackend>, threshold: f32) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            backend,
            threshold,
            every_n: 1,
            loaded: false,
            invocations: 0,
            failures: 0,
        }
    }

    /// Run only on cycles where `cycle % every_n == 0`. Zero is treated as one.
    pub fn with_cadence(mut self, every_n: u64) -> Self {
        self.every_n = every_n.max(1);
        self
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn kind(&self) -> DetectorKind {
        self.backend.kind()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn cadence(&self) -> u64 {
        self.every_n
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Number of `detect` calls that reached the backend.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Number of `detect` calls whose backend errored or panicked.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Load the backend. A second call after success is a no-op.
    pub fn load(&mut self) -> bool {
        if self.loaded {
            return true;
        }
        let backend = &mut self.backend;
        match panic::catch_unwind(AssertUnwindSafe(|| backend.load())) {
            Ok(Ok(())) => {
                self.loaded = true;
                log::info!(
                    "detector {} loaded (threshold={:.2}, every {} frame(s))",
                    self.name(),
                    self.threshold,
                    self.every_n
                );
                true
            }
            Ok(Err(e)) => {
                log::error!("detector {} failed to load: {:#}", self.name(), e);
                false
            }
            Err(_) => {
                log::error!("detector {} panicked while loading", self.name());
                false
            }
        }
    }

    /// Sampling policy for this detector.
    pub fn should_run(&self, cycle: u64) -> bool {
        cycle % self.every_n == 0
    }

    /// Run detection. Never fails outward and never returns a detection below the threshold.
    pub fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        if !self.loaded {
            log::warn!("detector {} used before load; skipping", self.name());
            return Vec::new();
        }
        self.invocations += 1;

        let threshold = self.threshold;
        let backend = &mut self.backend;
        let raw = match panic::catch_unwind(AssertUnwindSafe(|| backend.infer(frame, threshold))) {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                self.failures += 1;
                log::error!("error during {} detection: {:#}", self.name(), e);
                return Vec::new();
            }
            Err(_) => {
                self.failures += 1;
                log::error!("{} detection panicked; treating frame as empty", self.name());
                return Vec::new();
            }
        };

        let (width, height) = frame.dimensions();
        raw.into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= threshold)
            .filter_map(|mut d| {
                d.confidence = d.confidence.min(1.0);
                d.bbox = d.bbox.clamp_to(width, height)?;
                Some(d)
            })
            .collect()
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("threshold", &self.threshold)
            .field("every_n", &self.every_n)
            .field("loaded", &self.loaded)
            .finish()
    }
}
