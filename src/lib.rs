//! Real-time webcam pose capture.
//!
//! This library streams live camera video, estimates a single human pose
//! (17 keypoints) once per second with a `PoseNet` `MobileNetV1` network run
//! through ONNX Runtime, and draws the confident keypoints on a layer sized to
//! the viewport. A second, independent layer shows the device tilt as a 3D
//! axis frame while the orientation permission is granted.
//!
//! The pipeline consists of:
//! 1. Viewport tracking through a [`viewport::WindowHost`]
//! 2. A threaded camera feed with an explicit readiness state
//! 3. A one-shot model load followed by a periodic, non-overlapping detection task
//! 4. Keypoint and orientation rendering onto ARGB layers
//!
//! # Examples
//!
//! ## Drawing keypoints
//!
//! ```
//! use pose_capture::keypoint::{Keypoint, KeypointPart};
//! use pose_capture::renderer::{draw_keypoints, PixelCanvas};
//!
//! let keypoints = [
//!     Keypoint::new(KeypointPart::Nose, 10.0, 10.0, 0.9),
//!     Keypoint::new(KeypointPart::LeftEye, 20.0, 10.0, 0.2),
//! ];
//! let mut canvas = PixelCanvas::new(32, 32);
//! assert_eq!(draw_keypoints(&keypoints, 0.4, &mut canvas), 1);
//! ```
//!
//! ## Running the capture view
//!
//! ```no_run
//! use pose_capture::{
//!     capture_view::{CaptureProps, PoseCaptureView},
//!     frame_source::{CameraFeed, CameraSettings, FrameSource},
//!     orientation::DeviceOrientation,
//!     posenet::OnnxPoseNetLoader,
//!     viewport::HeadlessHost,
//! };
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (_orientation_tx, orientation_rx) = watch::channel(DeviceOrientation::default());
//! let frames: Arc<dyn FrameSource> = Arc::new(CameraFeed::new(CameraSettings::default()));
//! let mut view = PoseCaptureView::new(
//!     Arc::new(HeadlessHost),
//!     OnnxPoseNetLoader::new("assets/posenet_mobilenet_v1_075.onnx"),
//!     frames,
//!     CaptureProps::new(orientation_rx, true),
//! );
//!
//! view.activate();
//! let tree = view.render()?;
//! // Without a windowing environment only the orientation layer mounts
//! assert!(tree.video.is_none());
//! assert!(tree.orientation.is_some());
//! # Ok(())
//! # }
//! ```

/// Keypoint and pose types
pub mod keypoint;

/// Viewport size tracking
pub mod viewport;

/// Live video frame sources
pub mod frame_source;

/// Pose model lifecycle
pub mod inference;

/// `PoseNet` ONNX backend and single-pose decoding
pub mod posenet;

/// Periodic pose detection task
pub mod detection;

/// Keypoint drawing
pub mod renderer;

/// Device orientation overlay
pub mod orientation;

/// Composition root of the capture pipeline
pub mod capture_view;

/// Utility functions for casting and image conversion
pub mod utils;

/// Error types and result handling
pub mod error;

/// Main application module
pub mod app;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
