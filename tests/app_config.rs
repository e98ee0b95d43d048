use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use smart_detect::config::AppConfig;
use smart_detect::{LogLevel, SourceSpec};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SMART_DETECT_CONFIG",
        "SMART_DETECT_CAMERA_ID",
        "SMART_DETECT_SOURCE",
        "SMART_DETECT_MODEL_PATH",
        "SMART_DETECT_CONFIDENCE",
        "SMART_DETECT_OBJECT_EVERY",
        "SMART_DETECT_FACE_CASCADE",
        "SMART_DETECT_FACES",
        "SMART_DETECT_OUTPUT",
        "SMART_DETECT_DISPLAY",
        "SMART_DETECT_LOG_LEVEL",
        "SMART_DETECT_LOG_FILE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": { "camera_id": 2, "width": 1280, "height": 720, "fps": 15 },
        "object": { "model_path": "models/yolov8s.onnx", "confidence": 0.6, "every_n_frames": 3 },
        "face": { "enabled": false },
        "output": { "path": "runs/out.avi", "fourcc": "MJPG" },
        "display": { "window_name": "Lobby", "quit_keys": ["x", "ESC"], "stats_overlay": false },
        "logging": { "level": "debug", "file": "lobby.log" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("SMART_DETECT_CONFIG", file.path());
    std::env::set_var("SMART_DETECT_CONFIDENCE", "0.75");
    std::env::set_var("SMART_DETECT_DISPLAY", "off");

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.camera.camera_id, 2);
    assert_eq!(cfg.camera.source_spec().unwrap(), SourceSpec::Device(2));
    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (1280, 720, 15));
    assert_eq!(cfg.object.model_path, "models/yolov8s.onnx");
    assert_eq!(cfg.object.confidence, 0.75);
    assert_eq!(cfg.object.every_n_frames, 3);
    assert!(!cfg.face.enabled);
    assert_eq!(cfg.output.path.as_deref(), Some(std::path::Path::new("runs/out.avi")));
    assert_eq!(cfg.output.fourcc, "MJPG");
    assert!(!cfg.display.enabled);
    assert_eq!(cfg.display.window_name, "Lobby");
    assert_eq!(cfg.display.quit_keys, vec![b'x' as i32, 27]);
    assert!(!cfg.display.stats_overlay);
    assert_eq!(cfg.logging.level, LogLevel::Debug);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[camera]
source = "stub://hallway?frames=10"

[object]
model_path = "stub://objects"
every_n_frames = 2

[logging]
level = "warning"
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = AppConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(
        cfg.camera.source_spec().unwrap(),
        SourceSpec::Synthetic {
            name: "hallway".to_string(),
            frame_limit: Some(10)
        }
    );
    assert_eq!(cfg.object.model_path, "stub://objects");
    assert_eq!(cfg.object.every_n_frames, 2);
    assert_eq!(cfg.face.every_n_frames, 1);
    assert_eq!(cfg.logging.level, LogLevel::Warning);
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.source_spec().unwrap(), SourceSpec::Device(0));
    assert_eq!(cfg.object.model_path, "yolov8n.onnx");
    assert_eq!(cfg.object.confidence, 0.5);
    assert_eq!(cfg.object.every_n_frames, 5);
    assert!(cfg.face.enabled);
    assert!(cfg.output.path.is_none());
    assert_eq!(cfg.output.fourcc, "XVID");
    assert!(cfg.display.enabled);
    assert_eq!(cfg.display.quit_keys, vec![113, 81, 27]);
    assert_eq!(cfg.logging.level, LogLevel::Info);
    assert_eq!(
        cfg.logging.file.as_deref(),
        Some(std::path::Path::new("smart_detection.log"))
    );
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SMART_DETECT_CONFIDENCE", "1.5");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("SMART_DETECT_OBJECT_EVERY", "0");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("SMART_DETECT_FACES", "maybe");
    assert!(AppConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "camera": { "width": 0 } }"#)
        .expect("write config");
    assert!(AppConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    assert!(AppConfig::load_from(Some(file.path())).is_err());
}
