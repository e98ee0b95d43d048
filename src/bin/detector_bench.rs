//! detector_bench - compare object model throughput
//!
//! For each model: open the configured source, warm the detector up on a few frames, then
//! time detection over N frames and report FPS and average detections per frame.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use smart_detect::config::ObjectSettings;
use smart_detect::detect::{object_backend, Detector};
use smart_detect::ui::{format_duration, mark, Ui, UiMode};
use smart_detect::{AppConfig, CameraConfig, CameraSource, FrameSource};

const WARMUP_FRAMES: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "detector_bench", about = "Measure object detector throughput")]
struct Args {
    /// Models to benchmark. Defaults to the configured model list.
    models: Vec<String>,

    /// Config file (JSON, or TOML by extension). Defaults to $SMART_DETECT_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Frame source override: camera index, file path or stub://name
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Timed frames per model
    #[arg(long, default_value_t = 100)]
    frames: usize,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

#[derive(Debug)]
struct BenchResult {
    model: String,
    frames: usize,
    elapsed: Duration,
    detections: usize,
}

impl BenchResult {
    fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    fn avg_detections(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.detections as f64 / self.frames as f64
        }
    }

    fn rating(&self) -> &'static str {
        match self.fps() {
            fps if fps >= 80.0 => "excellent",
            fps if fps >= 50.0 => "great",
            fps if fps >= 30.0 => "good",
            _ => "slow",
        }
    }
}

fn bench(cfg: &AppConfig, model: &str, frames: usize) -> Result<BenchResult> {
    let settings = ObjectSettings {
        model_path: model.to_string(),
        ..cfg.object.clone()
    };
    let mut detector = Detector::from_boxed(object_backend(&settings)?, settings.confidence);
    if !detector.load() {
        return Err(anyhow!("failed to load {}", model));
    }

    let mut source = CameraSource::new(CameraConfig {
        source: cfg.camera.source_spec()?,
        width: cfg.camera.width,
        height: cfg.camera.height,
        fps: cfg.camera.fps,
    });
    source.initialize()?;

    for _ in 0..WARMUP_FRAMES {
        if let Some(frame) = source.read() {
            detector.detect(&frame);
        }
    }

    let mut result = BenchResult {
        model: model.to_string(),
        frames: 0,
        elapsed: Duration::ZERO,
        detections: 0,
    };
    let start = Instant::now();
    for _ in 0..frames {
        let Some(frame) = source.read() else {
            log::warn!("source ended after {} timed frames", result.frames);
            break;
        };
        result.detections += detector.detect(&frame).len();
        result.frames += 1;
    }
    result.elapsed = start.elapsed();
    source.release();

    if result.frames == 0 {
        return Err(anyhow!("no frames could be read from {}", source.name()));
    }
    Ok(result)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let mut cfg = match args.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path))?,
        None => AppConfig::load()?,
    };
    if let Some(source) = &args.source {
        cfg.camera.source = Some(source.clone());
    }
    let models = if args.models.is_empty() {
        cfg.object.available_models.clone()
    } else {
        args.models.clone()
    };

    let mut results = Vec::new();
    for model in &models {
        let mut stage = ui.stage(&format!("Benchmark {}", model));
        match bench(&cfg, model, args.frames) {
            Ok(result) => results.push(result),
            Err(err) => stage.fail(format!("{:#}", err)),
        }
    }

    if results.is_empty() {
        return Err(anyhow!("no model could be benchmarked"));
    }

    results.sort_by(|a, b| b.fps().total_cmp(&a.fps()));
    println!(
        "{:<24} {:>8} {:>12} {:>10} {:<10}",
        "MODEL", "FPS", "AVG OBJECTS", "TIME", "RATING"
    );
    for result in &results {
        println!(
            "{:<24} {:>8.1} {:>12.1} {:>10} {:<10}",
            result.model,
            result.fps(),
            result.avg_detections(),
            format_duration(result.elapsed),
            result.rating()
        );
    }

    println!();
    let fastest = &results[0];
    println!("{} fastest: {} ({:.1} FPS)", mark(true), fastest.model, fastest.fps());
    if let Some(busiest) = results
        .iter()
        .max_by(|a, b| a.avg_detections().total_cmp(&b.avg_detections()))
    {
        println!(
            "{} most detections: {} ({:.1} per frame)",
            mark(true),
            busiest.model,
            busiest.avg_detections()
        );
    }
    if results.len() > 2 {
        let balanced = &results[results.len() / 2];
        println!("{} balanced: {} ({:.1} FPS)", mark(true), balanced.model, balanced.fps());
    }
    Ok(())
}
