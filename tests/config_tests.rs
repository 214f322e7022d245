//! Configuration file tests

use pose_capture::{
    config::{Config, EXAMPLE_CONFIG},
    Error,
};
use std::time::Duration;

#[test]
fn test_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let mut config = Config::default();
    config.camera.index = 1;
    config.camera.width = Some(1280);
    config.orientation.frame_interval_ms = 33;
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.overlay_settings().frame_interval, Duration::from_millis(33));
}

#[test]
fn test_example_config_parses_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("example.yaml");
    std::fs::write(&path, EXAMPLE_CONFIG).unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.display.window_title, "Pose Capture");
}

#[test]
fn test_missing_file_is_io_error() {
    let result = Config::from_file("does/not/exist.yaml");
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_malformed_yaml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "camera: [not, a, map").unwrap();

    match Config::from_file(&path) {
        Err(Error::ConfigError(msg)) => assert!(msg.contains("Failed to parse config")),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_wrong_field_type_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.yaml");
    std::fs::write(&path, "orientation:\n  frame_interval_ms: fast\n").unwrap();
    assert!(matches!(Config::from_file(&path), Err(Error::ConfigError(_))));
}
