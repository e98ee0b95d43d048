//! verify_models - check that detector models load and behave
//!
//! For each object model (named on the command line, or the configured list) this builds
//! the backend, loads it, and runs it once over a blank frame, where nothing should be
//! found. The face cascade is checked the same way unless disabled.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use smart_detect::config::ObjectSettings;
use smart_detect::detect::{face_backend, object_backend, Detector};
use smart_detect::ui::{mark, Ui, UiMode};
use smart_detect::{AppConfig, Frame};

#[derive(Parser, Debug)]
#[command(name = "verify_models", about = "Verify that detector models load")]
struct Args {
    /// Object models to check. Defaults to the configured model list.
    models: Vec<String>,

    /// Config file (JSON, or TOML by extension). Defaults to $SMART_DETECT_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Confidence threshold used for the blank-frame check
    #[arg(long, default_value_t = 0.5)]
    confidence: f32,

    /// Skip the face cascade
    #[arg(long)]
    no_faces: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

struct Outcome {
    name: String,
    loaded: bool,
    blank_detections: Option<usize>,
}

fn check(ui: &Ui, name: &str, detector: Result<Detector>) -> Outcome {
    let mut stage = ui.stage(&format!("Load {}", name));
    let mut detector = match detector {
        Ok(detector) => detector,
        Err(err) => {
            stage.fail(format!("{:#}", err));
            return Outcome {
                name: name.to_string(),
                loaded: false,
                blank_detections: None,
            };
        }
    };
    if !detector.load() {
        stage.fail("load failed (see log)");
        return Outcome {
            name: name.to_string(),
            loaded: false,
            blank_detections: None,
        };
    }
    drop(stage);
    let blank = Frame::black(640, 480);
    let found = detector.detect(&blank).len();
    Outcome {
        name: name.to_string(),
        loaded: true,
        blank_detections: Some(found),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let cfg = match args.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path))?,
        None => AppConfig::load()?,
    };
    let models = if args.models.is_empty() {
        cfg.object.available_models.clone()
    } else {
        args.models.clone()
    };

    println!("verify_models: checking {} object model(s)", models.len());
    let mut outcomes = Vec::new();
    for model in &models {
        let settings = ObjectSettings {
            model_path: model.clone(),
            ..cfg.object.clone()
        };
        let detector = object_backend(&settings)
            .map(|backend| Detector::from_boxed(backend, args.confidence));
        outcomes.push(check(&ui, model, detector));
    }
    if !args.no_faces {
        let detector = face_backend(&cfg.face)
            .map(|backend| Detector::from_boxed(backend, cfg.face.confidence));
        outcomes.push(check(&ui, &cfg.face.cascade_path, detector));
    }

    println!();
    println!("{:<40} {:<8} {}", "MODEL", "STATUS", "BLANK-FRAME DETECTIONS");
    for outcome in &outcomes {
        let blank = match outcome.blank_detections {
            Some(n) => format!("{} (expected 0)", n),
            None => "-".to_string(),
        };
        let status = if outcome.loaded { "OK" } else { "FAILED" };
        println!(
            "{} {:<38} {:<8} {}",
            mark(outcome.loaded),
            outcome.name,
            status,
            blank
        );
    }

    let working = outcomes.iter().filter(|o| o.loaded).count();
    println!();
    println!("{}/{} models working", working, outcomes.len());
    if working == 0 {
        return Err(anyhow!("no model could be loaded"));
    }
    if working == outcomes.len() {
        if let Some(model) = models.first() {
            println!("try one with: smart_detect --model-path {}", model);
        }
    }
    Ok(())
}
