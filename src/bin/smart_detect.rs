//! smart_detect - live camera detection
//!
//! Pulls frames from a camera (or a video file, or a `stub://` scene), runs the object
//! detector every few frames and the face detector every frame, draws the results, and
//! shows them in a window and/or records them to a video file.
//!
//! Exit status is non-zero when the run could not start (camera, detectors, output).

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use smart_detect::{
    build_pipeline, install_interrupt_handler, logging, AppConfig, LogLevel, SourceSpec,
};

#[derive(Parser, Debug)]
#[command(
    name = "smart_detect",
    version,
    about = "Webcam smart detection: objects and faces, live"
)]
struct Args {
    /// Config file (JSON, or TOML by extension). Defaults to $SMART_DETECT_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera device ID
    #[arg(long, value_name = "ID")]
    camera_id: Option<i32>,

    /// Video source instead of a camera: file path or stub://name?frames=N
    #[arg(long, value_name = "SOURCE", conflicts_with = "camera_id")]
    source: Option<String>,

    /// Object model path (yolov8n.onnx fastest, yolov8s balanced, yolov8m/l most accurate)
    #[arg(long, value_name = "PATH")]
    model_path: Option<String>,

    /// Confidence threshold for object detections
    #[arg(long, value_name = "0..1")]
    confidence: Option<f32>,

    /// Run without a video window
    #[arg(long)]
    no_display: bool,

    /// Record annotated video to this path
    #[arg(long, value_name = "PATH")]
    save_output: Option<PathBuf>,

    /// Logging level
    #[arg(long, value_enum, ignore_case = true)]
    log_level: Option<LogLevel>,

    /// Enable the face detector
    #[arg(long, overrides_with = "no_faces")]
    faces: bool,

    /// Disable the face detector
    #[arg(long, overrides_with = "faces")]
    no_faces: bool,

    /// Run the object detector every N frames
    #[arg(long, value_name = "N")]
    object_every: Option<u64>,
}

impl Args {
    fn apply(self, cfg: &mut AppConfig) {
        if let Some(id) = self.camera_id {
            cfg.camera.camera_id = id;
            cfg.camera.source = None;
        }
        if let Some(source) = self.source {
            cfg.camera.source = Some(source);
        }
        if let Some(model) = self.model_path {
            cfg.object.model_path = model;
        }
        if let Some(confidence) = self.confidence {
            cfg.object.confidence = confidence;
        }
        if self.no_display {
            cfg.display.enabled = false;
        }
        if let Some(path) = self.save_output {
            cfg.output.path = Some(path);
        }
        if let Some(level) = self.log_level {
            cfg.logging.level = level;
        }
        if self.faces {
            cfg.face.enabled = true;
        }
        if self.no_faces {
            cfg.face.enabled = false;
        }
        if let Some(every) = self.object_every {
            cfg.object.every_n_frames = every;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path))?,
        None => AppConfig::load()?,
    };
    args.apply(&mut cfg);
    cfg.validate()?;

    let log_guard = logging::init(&cfg.logging)?;
    log::info!("Starting Webcam Smart Detection Application");
    match cfg.camera.source_spec()? {
        SourceSpec::Device(id) => log::info!("Camera ID: {}", id),
        other => log::info!("Source: {}", other),
    }
    log::info!("Model: {}", cfg.object.model_path);
    log::info!("Confidence threshold: {}", cfg.object.confidence);

    let mut pipeline = build_pipeline(&cfg)?;
    install_interrupt_handler(&pipeline.stop_handle());

    let report = pipeline.run();
    for (name, calls) in &report.detector_invocations {
        log::info!("detector {}: {} invocations", name, calls);
    }
    if let Some(path) = &cfg.output.path {
        if report.frames_written > 0 {
            log::info!("saved {} frames to {}", report.frames_written, path.display());
        }
    }

    if let Some(stage) = report.failure {
        log::error!(
            "Application error: {} stage failed: {}",
            stage.stage(),
            report.error.as_deref().unwrap_or("unknown error")
        );
        drop(log_guard);
        std::process::exit(1);
    }
    log::info!("Application finished");
    Ok(())
}
