//! Constants used throughout the application

/// Number of keypoints produced by the `PoseNet` model
pub const NUM_KEYPOINTS: usize = 17;

/// Period of the pose detection timer in milliseconds
pub const DETECTION_INTERVAL_MS: u64 = 1000;

/// Keypoints must score strictly above this to be drawn
pub const KEYPOINT_CONFIDENCE_THRESHOLD: f32 = 0.40;

/// `PoseNet` preset: output stride of the `MobileNetV1` backbone
pub const POSENET_OUTPUT_STRIDE: usize = 16;

/// `PoseNet` preset: square input resolution in pixels
pub const POSENET_INPUT_RESOLUTION: usize = 257;

/// `PoseNet` preset: `MobileNetV1` depth multiplier
pub const POSENET_MULTIPLIER: f32 = 0.75;

/// Side of the heatmap grid for the preset: (257 - 1) / 16 + 1
pub const POSENET_OUTPUT_RESOLUTION: usize = (POSENET_INPUT_RESOLUTION - 1) / POSENET_OUTPUT_STRIDE + 1;

/// `MobileNet` input normalization: pixel / 127.5 - 1.0
pub const IMAGE_NORMALIZATION_SCALE: f32 = 127.5;
pub const IMAGE_NORMALIZATION_OFFSET: f32 = 1.0;

/// Keypoint marker radius in pixels
pub const KEYPOINT_RADIUS: f32 = 3.0;

/// Keypoint marker color (ARGB, aqua)
pub const KEYPOINT_COLOR: u32 = 0xFF00_FFFF;

/// Orientation axis colors (ARGB)
pub const AXIS_X_COLOR: u32 = 0xFFFF_0000;
pub const AXIS_Y_COLOR: u32 = 0xFF00_FF00;
pub const AXIS_Z_COLOR: u32 = 0xFF00_00FF;

/// Default orientation overlay redraw period in milliseconds
pub const DEFAULT_ORIENTATION_FRAME_MS: u64 = 16;

/// Shortest overlay redraw period; shorter settings are raised to it
pub const MIN_ORIENTATION_FRAME_MS: u64 = 1;

/// Default axis length as a fraction of the shorter viewport side
pub const DEFAULT_AXIS_LENGTH_RATIO: f64 = 0.2;

/// Virtual camera distance used for the weak perspective of the axis overlay
pub const AXIS_CAMERA_DISTANCE: f64 = 4.0;

/// Banner shown when the pose model could not be loaded
pub const DETECTION_UNAVAILABLE_MESSAGE: &str = "pose detection unavailable";
