//! Smart Detect
//!
//! Real-time detection over a live video source: frames are pulled from a camera, run
//! through one or more detectors, annotated, and pushed to a display and/or a video file.
//!
//! # Architecture
//!
//! One cycle flows strictly in one direction:
//!
//! `FrameSource → Detector(s) → Annotator → FrameWriter, Display`
//!
//! The `Pipeline` owns every stage for the duration of a run and is the only component
//! with control flow. Stage failures stop at the stage boundary: a detector error is an
//! empty result, an annotation panic leaves the frame as drawn so far, a failed write is
//! logged. Only the source ending or a stop request ends a run.
//!
//! # Module Structure
//!
//! - `frame`: BGR frame buffers and camera properties
//! - `ingest`: frame sources (capture devices, files, synthetic `stub://` scenes)
//! - `detect`: detection records, the `Detector` adapter and its backends
//! - `annotate`: boxes, labels and the statistics overlay
//! - `sink`: video writers and interactive displays
//! - `pipeline`: the run state machine, stop handles and run reports
//! - `config`, `logging`, `ui`, `app`: configuration, process logging, terminal output
//!   and the wiring used by the binaries

pub mod annotate;
pub mod app;
pub mod config;
#[cfg(feature = "opencv")]
mod cv;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod sink;
pub mod ui;

pub use annotate::{Annotator, OverlayOptions};
pub use app::{build_detectors, build_pipeline};
pub use config::AppConfig;
pub use detect::{BoundingBox, Detection, DetectionGroup, Detector, DetectorBackend, DetectorKind};
pub use frame::{CameraInfo, Frame};
pub use ingest::{CameraConfig, CameraSource, FrameSource, SourceSpec};
pub use logging::{LogGuard, LogLevel, LoggingConfig};
pub use pipeline::{
    install_interrupt_handler, InitFailure, Pipeline, PipelineOptions, PipelineState,
    RunReport, RunStats, StopHandle, StopReason,
};
pub use sink::{Display, FrameWriter, MjpegAviWriter};
