//! Configuration management for the pose capture application

use crate::{frame_source::CameraSettings, orientation::OverlaySettings, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera configuration
    pub camera: CameraConfig,

    /// Model configuration
    pub model: ModelConfig,

    /// Display configuration
    pub display: DisplayConfig,

    /// Orientation overlay configuration
    pub orientation: OrientationConfig,
}

/// Camera selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index
    pub index: i32,

    /// Requested capture width, driver default if unset
    pub width: Option<u32>,

    /// Requested capture height, driver default if unset
    pub height: Option<u32>,
}

/// Model file configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the `PoseNet` `MobileNetV1` ONNX model
    pub posenet: PathBuf,
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Window title
    pub window_title: String,

    /// Initial window width
    pub window_width: u32,

    /// Initial window height
    pub window_height: u32,

    /// Mirror the camera image horizontally
    pub flip_x: bool,

    /// Directory screenshots are written to
    pub screenshot_dir: PathBuf,
}

/// Orientation overlay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Redraw period of the overlay in milliseconds
    pub frame_interval_ms: u64,

    /// Axis length relative to the shorter viewport side (0.0-1.0)
    pub axis_length_ratio: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: None,
            height: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            posenet: PathBuf::from("assets/posenet_mobilenet_v1_075.onnx"),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_title: "Pose Capture".to_string(),
            window_width: 640,
            window_height: 480,
            flip_x: true,
            screenshot_dir: PathBuf::from("."),
        }
    }
}

impl Default for OrientationConfig {
    fn default() -> Self {
        let overlay = OverlaySettings::default();
        Self {
            frame_interval_ms: u64::try_from(overlay.frame_interval.as_millis()).unwrap_or(u64::MAX),
            axis_length_ratio: overlay.axis_length_ratio,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Capture parameters for the camera feed
    #[must_use]
    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            index: self.camera.index,
            width: self.camera.width,
            height: self.camera.height,
            flip_x: self.display.flip_x,
        }
    }

    /// Redraw parameters for the orientation overlay
    #[must_use]
    pub fn overlay_settings(&self) -> OverlaySettings {
        OverlaySettings {
            frame_interval: Duration::from_millis(self.orientation.frame_interval_ms),
            axis_length_ratio: self.orientation.axis_length_ratio,
        }
    }

    /// Validate configuration
    ///
    /// The model path is not checked here; a missing model degrades the
    /// view instead of preventing startup.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.camera.index < 0 {
            return Err(Error::ConfigError("Camera index must not be negative".to_string()));
        }
        if self.camera.width == Some(0) || self.camera.height == Some(0) {
            return Err(Error::ConfigError(
                "Requested camera size must be greater than 0".to_string(),
            ));
        }

        if self.display.window_width == 0 || self.display.window_height == 0 {
            return Err(Error::ConfigError("Window size must be greater than 0".to_string()));
        }

        if self.orientation.frame_interval_ms == 0 {
            return Err(Error::ConfigError(
                "Orientation frame interval must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.orientation.axis_length_ratio) {
            return Err(Error::ConfigError(
                "Axis length ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.model.posenet.as_os_str().is_empty() {
            return Err(Error::ConfigError("PoseNet model path must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Pose Capture Configuration

# Camera selection
camera:
  index: 0
  # width: 1280
  # height: 720

# Model paths
model:
  posenet: "assets/posenet_mobilenet_v1_075.onnx"

# Display settings
display:
  window_title: "Pose Capture"
  window_width: 640
  window_height: 480
  flip_x: true
  screenshot_dir: "."

# Orientation overlay
orientation:
  frame_interval_ms: 16
  axis_length_ratio: 0.2
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_example_matches_default() {
        let parsed: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("camera:\n  index: 2\n").unwrap();
        assert_eq!(parsed.camera.index, 2);
        assert_eq!(parsed.display, DisplayConfig::default());
        assert_eq!(parsed.overlay_settings(), OverlaySettings::default());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.orientation.axis_length_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.orientation.frame_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.width = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.index = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_camera_settings_carry_flip() {
        let mut config = Config::default();
        config.display.flip_x = false;
        config.camera.index = 3;
        let settings = config.camera_settings();
        assert_eq!(settings.index, 3);
        assert!(!settings.flip_x);
    }
}
