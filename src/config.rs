//! Application configuration.
//!
//! Layering, lowest to highest precedence: built-in defaults, the config file named by
//! `SMART_DETECT_CONFIG` (JSON, or TOML when the extension is `.toml`), `SMART_DETECT_*`
//! environment variables, then command-line flags applied by the binary.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::SourceSpec;
use crate::logging::{LogLevel, LoggingConfig};
use crate::sink::DEFAULT_QUIT_KEYS;

pub const CONFIG_ENV: &str = "SMART_DETECT_CONFIG";

const DEFAULT_CAMERA_ID: i32 = 0;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_MODEL: &str = "yolov8n.onnx";
const DEFAULT_MODELS: [&str; 5] = [
    "yolov8n.onnx",
    "yolov8s.onnx",
    "yolov8m.onnx",
    "yolov8l.onnx",
    "yolov8x.onnx",
];
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_OBJECT_EVERY: u64 = 5;
const DEFAULT_NMS_IOU: f32 = 0.45;
const DEFAULT_CASCADE: &str = "haarcascade_frontalface_default.xml";
const DEFAULT_FACE_CONFIDENCE: f32 = 0.5;
const DEFAULT_FACE_EVERY: u64 = 1;
const DEFAULT_FOURCC: &str = "XVID";
const DEFAULT_WINDOW: &str = "Smart Detection";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    object: Option<ObjectConfigFile>,
    face: Option<FaceConfigFile>,
    output: Option<OutputConfigFile>,
    display: Option<DisplayConfigFile>,
    logging: Option<LoggingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    camera_id: Option<i32>,
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ObjectConfigFile {
    model_path: Option<String>,
    available_models: Option<Vec<String>>,
    confidence: Option<f32>,
    every_n_frames: Option<u64>,
    nms_iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FaceConfigFile {
    enabled: Option<bool>,
    cascade_path: Option<String>,
    confidence: Option<f32>,
    every_n_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    path: Option<PathBuf>,
    fourcc: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    enabled: Option<bool>,
    window_name: Option<String>,
    quit_keys: Option<Vec<String>>,
    stats_overlay: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoggingConfigFile {
    level: Option<LogLevel>,
    file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub camera: CameraSettings,
    pub object: ObjectSettings,
    pub face: FaceSettings,
    pub output: OutputSettings,
    pub display: DisplaySettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub camera_id: i32,
    /// Overrides `camera_id` when set: a file path or a `stub://` scene.
    pub source: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct ObjectSettings {
    pub model_path: String,
    /// Models compared by `verify_models` and `detector_bench` when none are named.
    pub available_models: Vec<String>,
    pub confidence: f32,
    pub every_n_frames: u64,
    pub nms_iou: f32,
}

#[derive(Debug, Clone)]
pub struct FaceSettings {
    pub enabled: bool,
    pub cascade_path: String,
    pub confidence: f32,
    pub every_n_frames: u64,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Presence enables the persistent writer.
    pub path: Option<PathBuf>,
    pub fourcc: String,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub enabled: bool,
    pub window_name: String,
    pub quit_keys: Vec<i32>,
    pub stats_overlay: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            object: ObjectSettings::default(),
            face: FaceSettings::default(),
            output: OutputSettings::default(),
            display: DisplaySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            camera_id: DEFAULT_CAMERA_ID,
            source: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

impl Default for ObjectSettings {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL.to_string(),
            available_models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            confidence: DEFAULT_CONFIDENCE,
            every_n_frames: DEFAULT_OBJECT_EVERY,
            nms_iou: DEFAULT_NMS_IOU,
        }
    }
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cascade_path: DEFAULT_CASCADE.to_string(),
            confidence: DEFAULT_FACE_CONFIDENCE,
            every_n_frames: DEFAULT_FACE_EVERY,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: None,
            fourcc: DEFAULT_FOURCC.to_string(),
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_name: DEFAULT_WINDOW.to_string(),
            quit_keys: DEFAULT_QUIT_KEYS.to_vec(),
            stats_overlay: true,
        }
    }
}

impl CameraSettings {
    /// The frame source this section names.
    pub fn source_spec(&self) -> Result<SourceSpec> {
        match self.source.as_deref() {
            Some(raw) => SourceSpec::parse(raw),
            None => Ok(SourceSpec::Device(self.camera_id)),
        }
    }
}

impl AppConfig {
    /// Defaults, then the file named by `SMART_DETECT_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file taking the place of `SMART_DETECT_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let camera = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            camera_id: camera.camera_id.unwrap_or(defaults.camera.camera_id),
            source: camera.source.filter(|s| !s.trim().is_empty()),
            width: camera.width.unwrap_or(defaults.camera.width),
            height: camera.height.unwrap_or(defaults.camera.height),
            fps: camera.fps.unwrap_or(defaults.camera.fps),
        };

        let object = file.object.unwrap_or_default();
        let object = ObjectSettings {
            model_path: object.model_path.unwrap_or(defaults.object.model_path),
            available_models: object
                .available_models
                .unwrap_or(defaults.object.available_models),
            confidence: object.confidence.unwrap_or(defaults.object.confidence),
            every_n_frames: object
                .every_n_frames
                .unwrap_or(defaults.object.every_n_frames),
            nms_iou: object.nms_iou.unwrap_or(defaults.object.nms_iou),
        };

        let face = file.face.unwrap_or_default();
        let face = FaceSettings {
            enabled: face.enabled.unwrap_or(defaults.face.enabled),
            cascade_path: face.cascade_path.unwrap_or(defaults.face.cascade_path),
            confidence: face.confidence.unwrap_or(defaults.face.confidence),
            every_n_frames: face.every_n_frames.unwrap_or(defaults.face.every_n_frames),
        };

        let output = file.output.unwrap_or_default();
        let output = OutputSettings {
            path: output.path.or(defaults.output.path),
            fourcc: output.fourcc.unwrap_or(defaults.output.fourcc),
        };

        let display = file.display.unwrap_or_default();
        let quit_keys = match display.quit_keys {
            Some(names) => parse_quit_keys(&names)?,
            None => defaults.display.quit_keys,
        };
        let display = DisplaySettings {
            enabled: display.enabled.unwrap_or(defaults.display.enabled),
            window_name: display.window_name.unwrap_or(defaults.display.window_name),
            quit_keys,
            stats_overlay: display
                .stats_overlay
                .unwrap_or(defaults.display.stats_overlay),
        };

        let logging = file.logging.unwrap_or_default();
        let logging = LoggingConfig {
            level: logging.level.unwrap_or(defaults.logging.level),
            file: logging.file.or(defaults.logging.file),
        };

        Ok(Self {
            camera,
            object,
            face,
            output,
            display,
            logging,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(id) = env_parse::<i32>("SMART_DETECT_CAMERA_ID")? {
            self.camera.camera_id = id;
        }
        if let Some(source) = env_string("SMART_DETECT_SOURCE") {
            self.camera.source = Some(source);
        }
        if let Some(model) = env_string("SMART_DETECT_MODEL_PATH") {
            self.object.model_path = model;
        }
        if let Some(confidence) = env_parse::<f32>("SMART_DETECT_CONFIDENCE")? {
            self.object.confidence = confidence;
        }
        if let Some(every) = env_parse::<u64>("SMART_DETECT_OBJECT_EVERY")? {
            self.object.every_n_frames = every;
        }
        if let Some(cascade) = env_string("SMART_DETECT_FACE_CASCADE") {
            self.face.cascade_path = cascade;
        }
        if let Some(enabled) = env_bool("SMART_DETECT_FACES")? {
            self.face.enabled = enabled;
        }
        if let Some(path) = env_string("SMART_DETECT_OUTPUT") {
            self.output.path = Some(PathBuf::from(path));
        }
        if let Some(enabled) = env_bool("SMART_DETECT_DISPLAY")? {
            self.display.enabled = enabled;
        }
        if let Some(level) = env_string("SMART_DETECT_LOG_LEVEL") {
            self.logging.level = level.parse()?;
        }
        if let Some(file) = env_string("SMART_DETECT_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with. Called by `load`; binaries call it again
    /// after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("object confidence", self.object.confidence),
            ("face confidence", self.face.confidence),
            ("object nms_iou", self.object.nms_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", label, value));
            }
        }
        if self.object.every_n_frames == 0 || self.face.every_n_frames == 0 {
            return Err(anyhow!("every_n_frames must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera dimensions must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.object.model_path.trim().is_empty() {
            return Err(anyhow!("object model_path must not be empty"));
        }
        crate::frame::fourcc(&self.output.fourcc).context("invalid output fourcc")?;
        self.camera.source_spec()?;
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Map key names (`"q"`, `"ESC"`, or a decimal key code) to key codes.
pub fn parse_quit_keys(names: &[String]) -> Result<Vec<i32>> {
    names
        .iter()
        .map(|name| {
            let name = name.trim();
            if name.eq_ignore_ascii_case("esc") || name.eq_ignore_ascii_case("escape") {
                return Ok(27);
            }
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) if ch.is_ascii() => Ok(ch as i32),
                _ => name
                    .parse::<i32>()
                    .ok()
                    .filter(|code| (0..=255).contains(code))
                    .ok_or_else(|| anyhow!("unrecognised quit key {:?}", name)),
            }
        })
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value {:?}", key, value)),
        None => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_string(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(anyhow!("{} must be a boolean, got {:?}", key, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.object.every_n_frames, 5);
        assert_eq!(cfg.face.every_n_frames, 1);
        assert_eq!(cfg.output.fourcc, "XVID");
        assert_eq!(cfg.display.window_name, "Smart Detection");
        assert_eq!(cfg.camera.source_spec().unwrap(), SourceSpec::Device(0));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = AppConfig::default();
        cfg.object.confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.object.every_n_frames = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.camera.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.output.fourcc = "XV".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn quit_key_names_map_to_codes() {
        let names = vec!["q".to_string(), "Q".to_string(), "ESC".to_string(), "32".to_string()];
        assert_eq!(parse_quit_keys(&names).unwrap(), vec![113, 81, 27, 32]);
        assert!(parse_quit_keys(&["F12".to_string()]).is_err());
    }

    #[test]
    fn file_sections_override_defaults() {
        let file: AppConfigFile = serde_json::from_str(
            r#"{ "object": { "confidence": 0.7 }, "face": { "enabled": false } }"#,
        )
        .unwrap();
        let cfg = AppConfig::from_file(file).unwrap();
        assert_eq!(cfg.object.confidence, 0.7);
        assert_eq!(cfg.object.model_path, "yolov8n.onnx");
        assert!(!cfg.face.enabled);
        assert_eq!(cfg.camera.width, 640);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: std::result::Result<AppConfigFile, _> =
            serde_json::from_str(r#"{ "camera": { "resolution": "hd" } }"#);
        assert!(parsed.is_err());
    }
}
