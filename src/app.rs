//! Wiring from `AppConfig` to a ready-to-run `Pipeline`.

use anyhow::Result;

use crate::config::AppConfig;
use crate::detect::{face_backend, object_backend, Detector, DetectorKind, UnavailableBackend};
use crate::ingest::{CameraConfig, CameraSource};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::sink::{open_display, open_video_writer};

/// Detectors named by the configuration, in pipeline order: objects first, then faces.
///
/// A backend that cannot be constructed (missing feature, unknown path) still yields a
/// detector; it fails at load time so the pipeline applies its degraded/fatal policy.
pub fn build_detectors(cfg: &AppConfig) -> Vec<Detector> {
    let mut detectors = Vec::with_capacity(2);

    let object = object_backend(&cfg.object).unwrap_or_else(|err| {
        Box::new(UnavailableBackend::new(
            cfg.object.model_path.clone(),
            DetectorKind::Object,
            &err,
        ))
    });
    detectors.push(
        Detector::from_boxed(object, cfg.object.confidence).with_cadence(cfg.object.every_n_frames),
    );

    if cfg.face.enabled {
        let face = face_backend(&cfg.face).unwrap_or_else(|err| {
            Box::new(UnavailableBackend::new(
                cfg.face.cascade_path.clone(),
                DetectorKind::Face,
                &err,
            ))
        });
        detectors.push(
            Detector::from_boxed(face, cfg.face.confidence).with_cadence(cfg.face.every_n_frames),
        );
    }
    detectors
}

/// Build the full pipeline: camera, detectors, optional writer and optional display.
///
/// The display opens when the pipeline initializes; if it cannot, the run continues
/// headless.
pub fn build_pipeline(cfg: &AppConfig) -> Result<Pipeline> {
    let camera = CameraSource::new(CameraConfig {
        source: cfg.camera.source_spec()?,
        width: cfg.camera.width,
        height: cfg.camera.height,
        fps: cfg.camera.fps,
    });

    let mut pipeline = Pipeline::new(Box::new(camera)).with_options(PipelineOptions {
        quit_keys: cfg.display.quit_keys.clone(),
        stats_overlay: cfg.display.stats_overlay,
        quit_hint: cfg.display.enabled,
        ..PipelineOptions::default()
    });
    for detector in build_detectors(cfg) {
        pipeline = pipeline.with_detector(detector);
    }

    if let Some(path) = cfg.output.path.clone() {
        let output = cfg.output.clone();
        pipeline = pipeline.with_writer(move |info| open_video_writer(&path, info, &output));
    }

    if cfg.display.enabled {
        let settings = cfg.display.clone();
        pipeline = pipeline.with_display(move || open_display(&settings));
    }

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.camera.source = Some("stub://unit?frames=12".to_string());
        cfg.camera.width = 160;
        cfg.camera.height = 120;
        cfg.object.model_path = "stub://objects".to_string();
        cfg.face.cascade_path = "stub://faces".to_string();
        cfg.display.enabled = false;
        cfg.logging.file = None;
        cfg
    }

    #[test]
    fn detectors_follow_configuration() {
        let mut cfg = stub_config();
        let detectors = build_detectors(&cfg);
        assert_eq!(detectors.len(), 2);
        assert_eq!(detectors[0].kind(), DetectorKind::Object);
        assert_eq!(detectors[0].cadence(), 5);
        assert_eq!(detectors[1].kind(), DetectorKind::Face);

        cfg.face.enabled = false;
        assert_eq!(build_detectors(&cfg).len(), 1);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn unavailable_display_leaves_run_headless() -> Result<()> {
        let mut cfg = stub_config();
        cfg.display.enabled = true;
        let report = build_pipeline(&cfg)?.run();
        assert!(report.is_success());
        assert_eq!(report.frames_processed, 12);
        Ok(())
    }

    #[test]
    fn stub_pipeline_runs_to_end_of_stream() -> Result<()> {
        let cfg = stub_config();
        let mut pipeline = build_pipeline(&cfg)?;
        let report = pipeline.run();
        assert!(report.is_success());
        assert_eq!(report.frames_processed, 12);
        assert_eq!(report.detector_invocations[0].1, 3);
        assert_eq!(report.detector_invocations[1].1, 12);
        Ok(())
    }
}
