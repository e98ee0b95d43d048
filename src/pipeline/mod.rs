//! Pipeline orchestrator.
//!
//! Owns the frame source, the detectors and the sinks for one run and drives the
//! capture → detect → annotate → emit cycle:
//!
//! `Created → Initializing → Running → Stopping → Stopped`
//!
//! Initialization fails closed: a camera that will not open, every detector failing to
//! load, or an output file that cannot be created goes straight to `Stopped` without
//! entering `Running`. Inside `Running` only the frame source ending or an explicit stop
//! request ends the run; detector, annotation and sink errors cost one cycle's output.
//!
//! A pipeline can be run again after it stops. Each run opens its writer and display
//! afresh and starts with a cleared stop flag.

mod signal;
mod stats;

pub use signal::{install_interrupt_handler, StopHandle};
pub use stats::RunStats;

use std::fmt;
use std::time::Duration;

use anyhow::Result;

use crate::annotate::{Annotator, OverlayOptions};
use crate::detect::{DetectionGroup, Detector, DetectorKind};
use crate::frame::{CameraInfo, Frame};
use crate::ingest::FrameSource;
use crate::sink::{Display, FrameWriter, DEFAULT_QUIT_KEYS};

/// Builds the persistent writer once the camera's effective properties are known.
pub type WriterFactory = Box<dyn FnMut(&CameraInfo) -> Result<Box<dyn FrameWriter>>>;

/// Opens the interactive display at the start of each run.
pub type DisplayFactory = Box<dyn FnMut() -> Result<Box<dyn Display>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Initializing,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Created => "CREATED",
            PipelineState::Initializing => "INITIALIZING",
            PipelineState::Running => "RUNNING",
            PipelineState::Stopping => "STOPPING",
            PipelineState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// The initialization stage that stopped a run before it started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitFailure {
    Camera,
    Detectors,
    Output,
}

impl InitFailure {
    pub fn stage(self) -> &'static str {
        match self {
            InitFailure::Camera => "camera",
            InitFailure::Detectors => "detectors",
            InitFailure::Output => "output",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The source reported a failed read or the end of the stream.
    EndOfStream,
    /// A configured quit key was pressed in the display.
    QuitKey(i32),
    /// A stop request arrived through a `StopHandle` (including Ctrl+C).
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => f.write_str("end of stream"),
            StopReason::QuitKey(code) => write!(f, "quit key {}", code),
            StopReason::Interrupted => f.write_str("interrupted"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Key codes (as returned by `Display::poll_key`) that stop the run.
    pub quit_keys: Vec<i32>,
    /// Draw per-kind detection counts on every frame.
    pub stats_overlay: bool,
    /// Draw the quit hint; only takes effect when a display is attached.
    pub quit_hint: bool,
    /// Log rolling FPS every this many cycles. Zero disables the log line.
    pub fps_log_interval: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            quit_keys: DEFAULT_QUIT_KEYS.to_vec(),
            stats_overlay: true,
            quit_hint: true,
            fps_log_interval: 30,
        }
    }
}

/// Outcome of one `Pipeline::run`.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Every state entered, in order, starting with `Created`.
    pub transitions: Vec<PipelineState>,
    pub final_state: PipelineState,
    /// Why `Running` ended; `None` when the run never started.
    pub stop_reason: Option<StopReason>,
    pub failure: Option<InitFailure>,
    /// The error behind `failure`, formatted with its context chain.
    pub error: Option<String>,
    pub frames_processed: u64,
    pub frames_written: u64,
    pub elapsed: Duration,
    /// `(detector name, detect calls)` in registration order.
    pub detector_invocations: Vec<(String, u64)>,
    pub detections: Vec<(DetectorKind, u64)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn fps(&self) -> f64 {
        stats::fps(self.frames_processed, self.elapsed)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Released {
    source: bool,
    writer: bool,
    display: bool,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    detectors: Vec<Detector>,
    writer_factory: Option<WriterFactory>,
    writer: Option<Box<dyn FrameWriter>>,
    display_factory: Option<DisplayFactory>,
    display: Option<Box<dyn Display>>,
    options: PipelineOptions,
    stop: StopHandle,
    state: PipelineState,
    transitions: Vec<PipelineState>,
    released: Released,
    frames_written: u64,
}

impl Pipeline {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            detectors: Vec::new(),
            writer_factory: None,
            writer: None,
            display_factory: None,
            display: None,
            options: PipelineOptions::default(),
            stop: StopHandle::new(),
            state: PipelineState::Created,
            transitions: vec![PipelineState::Created],
            released: Released::default(),
            frames_written: 0,
        }
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Attach a persistent writer. The factory runs during initialization with the
    /// camera's effective properties.
    pub fn with_writer<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&CameraInfo) -> Result<Box<dyn FrameWriter>> + 'static,
    {
        self.writer_factory = Some(Box::new(factory));
        self
    }

    /// Attach an interactive display. The factory runs during initialization, after the
    /// writer; a display that fails to open leaves the run headless.
    pub fn with_display<F>(mut self, factory: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn Display>> + 'static,
    {
        self.display_factory = Some(Box::new(factory));
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops the run after the current cycle. Clone it into signal handlers.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    /// Execute one run to completion and tear everything down.
    pub fn run(&mut self) -> RunReport {
        self.begin_run();
        let mut stats = RunStats::new();

        self.transition(PipelineState::Initializing);
        if let Err((stage, err)) = self.initialize() {
            log::error!("pipeline initialization failed at {} stage: {:#}", stage.stage(), err);
            self.release_resources();
            self.transition(PipelineState::Stopped);
            self.stop.reset();
            return self.report(&stats, None, Some(stage), Some(format!("{:#}", err)));
        }

        self.transition(PipelineState::Running);
        stats = RunStats::new();
        let annotator = Annotator::new().with_overlay(OverlayOptions {
            stats: self.options.stats_overlay,
            quit_hint: self.options.quit_hint && self.display.is_some(),
        });

        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Interrupted;
            }
            let Some(mut frame) = self.source.read() else {
                break StopReason::EndOfStream;
            };

            let groups = self.detect_all(&frame, stats.frames());
            annotator.draw_in_place(&mut frame, &groups);
            let key = self.emit(&frame, &mut stats);
            stats.record_cycle(&groups);

            let interval = self.options.fps_log_interval;
            if interval > 0 && stats.frames() % interval == 0 {
                log::info!(
                    "processed {} frames, FPS: {:.2}",
                    stats.frames(),
                    stats.fps()
                );
            }
            if let Some(code) = key {
                break StopReason::QuitKey(code);
            }
        };

        log::info!("pipeline stopping: {}", reason);
        self.teardown();
        self.stop.reset();
        let report = self.report(&stats, Some(reason), None, None);
        log::info!(
            "pipeline stopped after {} frames in {:.1}s (avg FPS: {:.2})",
            report.frames_processed,
            report.elapsed.as_secs_f64(),
            report.fps()
        );
        report
    }

    /// Release the source, close the writer and close the display, each at most once per
    /// run. Safe to call repeatedly and from any state.
    pub fn teardown(&mut self) {
        if matches!(
            self.state,
            PipelineState::Initializing | PipelineState::Running
        ) {
            self.transition(PipelineState::Stopping);
        }
        self.release_resources();
        if self.state != PipelineState::Stopped {
            self.transition(PipelineState::Stopped);
        }
    }

    fn begin_run(&mut self) {
        self.state = PipelineState::Created;
        self.transitions = vec![PipelineState::Created];
        self.released = Released::default();
        self.frames_written = 0;
        self.writer = None;
        self.display = None;
    }

    fn initialize(&mut self) -> std::result::Result<(), (InitFailure, anyhow::Error)> {
        let info = self
            .source
            .initialize()
            .map_err(|err| (InitFailure::Camera, err.context(format!("open {}", self.source.name()))))?;

        if !self.detectors.is_empty() {
            let failed: Vec<String> = self
                .detectors
                .iter_mut()
                .filter_map(|d| (!d.load()).then(|| d.name().to_string()))
                .collect();
            if failed.len() == self.detectors.len() {
                return Err((
                    InitFailure::Detectors,
                    anyhow::anyhow!("no detector could be loaded ({})", failed.join(", ")),
                ));
            }
            if !failed.is_empty() {
                log::warn!(
                    "running degraded: {} detector(s) failed to load: {}",
                    failed.len(),
                    failed.join(", ")
                );
            }
        } else {
            log::warn!("no detectors configured; frames will pass through unannotated");
        }

        if let Some(factory) = self.writer_factory.as_mut() {
            let writer = factory(&info).map_err(|err| (InitFailure::Output, err))?;
            self.writer = Some(writer);
        }

        if let Some(factory) = self.display_factory.as_mut() {
            match factory() {
                Ok(display) => self.display = Some(display),
                Err(err) => log::warn!("display unavailable, running headless: {:#}", err),
            }
        }
        Ok(())
    }

    fn detect_all(&mut self, frame: &Frame, cycle: u64) -> Vec<DetectionGroup> {
        self.detectors
            .iter_mut()
            .filter(|d| d.is_loaded())
            .map(|d| {
                // Skipped cycles contribute an empty group, never the previous result.
                let detections = if d.should_run(cycle) {
                    d.detect(frame)
                } else {
                    Vec::new()
                };
                DetectionGroup::new(d.kind(), detections)
            })
            .collect()
    }

    /// Writer first, then display, then one key poll. Returns a quit key if one was pressed.
    fn emit(&mut self, frame: &Frame, stats: &mut RunStats) -> Option<i32> {
        if let Some(writer) = self.writer.as_mut() {
            match writer.write(frame) {
                Ok(()) => self.frames_written += 1,
                Err(err) => {
                    stats.record_write_failure();
                    log::error!("failed to write frame {}: {:#}", stats.frames(), err);
                }
            }
        }

        let display = self.display.as_mut()?;
        if let Err(err) = display.show(frame) {
            stats.record_display_failure();
            log::warn!("failed to display frame {}: {:#}", stats.frames(), err);
        }
        display
            .poll_key()
            .filter(|code| self.options.quit_keys.contains(code))
    }

    fn release_resources(&mut self) {
        if !self.released.source {
            self.released.source = true;
            self.source.release();
        }
        if !self.released.writer {
            self.released.writer = true;
            if let Some(mut writer) = self.writer.take() {
                match writer.close() {
                    Ok(()) => log::info!("video writer closed ({} frames)", writer.frames_written()),
                    Err(err) => log::error!("failed to close video writer: {:#}", err),
                }
            }
        }
        if !self.released.display {
            self.released.display = true;
            if let Some(mut display) = self.display.take() {
                display.close();
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::info!("pipeline {} -> {}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn report(
        &self,
        stats: &RunStats,
        stop_reason: Option<StopReason>,
        failure: Option<InitFailure>,
        error: Option<String>,
    ) -> RunReport {
        RunReport {
            transitions: self.transitions.clone(),
            final_state: self.state,
            stop_reason,
            failure,
            error,
            frames_processed: stats.frames(),
            frames_written: self.frames_written,
            elapsed: stats.elapsed(),
            detector_invocations: self
                .detectors
                .iter()
                .map(|d| (d.name().to_string(), d.invocations()))
                .collect(),
            detections: stats.detections().to_vec(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.release_resources();
    }
}
