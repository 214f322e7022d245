//! Device orientation overlay.
//!
//! Draws a small 3D axis frame rotated by the device tilt. The overlay runs
//! its own redraw loop, independent of pose detection, and only exists while
//! it is mounted.

use crate::{
    constants::{
        AXIS_CAMERA_DISTANCE, AXIS_X_COLOR, AXIS_Y_COLOR, AXIS_Z_COLOR, DEFAULT_AXIS_LENGTH_RATIO,
        DEFAULT_ORIENTATION_FRAME_MS, MIN_ORIENTATION_FRAME_MS,
    },
    renderer::{DrawingContext, PixelCanvas, SharedCanvas},
    viewport::ViewportSize,
    Error, Result,
};
use log::debug;
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Device tilt in degrees; missing readings count as zero
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceOrientation {
    /// Front-to-back tilt, rotation about the X axis
    pub beta: Option<f64>,
    /// Left-to-right tilt, rotation about the Y axis
    pub gamma: Option<f64>,
}

impl DeviceOrientation {
    #[must_use]
    pub fn new(beta: f64, gamma: f64) -> Self {
        Self {
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }

    /// Rotation of the device frame
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        let beta = self.beta.unwrap_or(0.0).to_radians();
        let gamma = self.gamma.unwrap_or(0.0).to_radians();
        UnitQuaternion::from_euler_angles(beta, gamma, 0.0)
    }
}

/// Parse a `"<beta> <gamma>"` line; commas are accepted as separators
///
/// # Errors
///
/// Returns an error unless the line holds exactly two finite numbers
pub fn parse_orientation_line(line: &str) -> Result<DeviceOrientation> {
    let values = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| Error::InvalidInput(format!("Invalid orientation angle '{s}'")))
        })
        .collect::<Result<Vec<_>>>()?;

    match values.as_slice() {
        [beta, gamma] => Ok(DeviceOrientation::new(*beta, *gamma)),
        _ => Err(Error::InvalidInput(format!(
            "Expected '<beta> <gamma>', got '{}'",
            line.trim()
        ))),
    }
}

/// One projected axis of the overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSegment {
    pub from: (f32, f32),
    pub to: (f32, f32),
    pub color: u32,
}

/// Project the rotated unit axes onto a `width x height` viewport.
///
/// The frame origin sits at the viewport center; `length_ratio` scales the
/// axes relative to the shorter viewport side. Screen Y grows downwards.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn axis_segments(
    orientation: &DeviceOrientation,
    width: u32,
    height: u32,
    length_ratio: f64,
) -> [AxisSegment; 3] {
    let rotation = orientation.rotation();
    let center = (f64::from(width) / 2.0, f64::from(height) / 2.0);
    let length = f64::from(width.min(height)) * length_ratio;

    let project = |axis: Vector3<f64>, color: u32| {
        let p = rotation * axis;
        let perspective = AXIS_CAMERA_DISTANCE / (AXIS_CAMERA_DISTANCE - p.z);
        AxisSegment {
            from: (center.0 as f32, center.1 as f32),
            to: (
                (center.0 + p.x * length * perspective) as f32,
                (center.1 - p.y * length * perspective) as f32,
            ),
            color,
        }
    };

    [
        project(Vector3::x(), AXIS_X_COLOR),
        project(Vector3::y(), AXIS_Y_COLOR),
        project(Vector3::z(), AXIS_Z_COLOR),
    ]
}

/// Draw the axis frame onto `ctx`
pub fn draw_axes<C: DrawingContext + ?Sized>(
    orientation: &DeviceOrientation,
    length_ratio: f64,
    ctx: &mut C,
) {
    for segment in axis_segments(orientation, ctx.width(), ctx.height(), length_ratio) {
        ctx.draw_line(segment.from, segment.to, segment.color);
    }
}

/// Overlay redraw parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySettings {
    pub frame_interval: Duration,
    pub axis_length_ratio: f64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(DEFAULT_ORIENTATION_FRAME_MS),
            axis_length_ratio: DEFAULT_AXIS_LENGTH_RATIO,
        }
    }
}

/// A mounted orientation overlay with its own layer and redraw task
pub struct OrientationOverlay {
    canvas: SharedCanvas,
    handle: JoinHandle<()>,
}

impl OrientationOverlay {
    /// Mount the overlay and start its redraw loop.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn mount(
        orientation: watch::Receiver<DeviceOrientation>,
        viewport: watch::Receiver<ViewportSize>,
        settings: OverlaySettings,
    ) -> Self {
        let canvas = PixelCanvas::shared(0, 0);
        let layer = Arc::clone(&canvas);
        let handle = tokio::spawn(async move {
            let period = settings
                .frame_interval
                .max(Duration::from_millis(MIN_ORIENTATION_FRAME_MS));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some((width, height)) = viewport.borrow().dimensions() else {
                    continue;
                };
                let current = *orientation.borrow();
                let mut canvas = layer.lock().unwrap_or_else(PoisonError::into_inner);
                canvas.resize(width, height);
                draw_axes(&current, settings.axis_length_ratio, &mut *canvas);
            }
        });
        debug!("Orientation overlay mounted");
        Self { canvas, handle }
    }

    /// The overlay's drawing layer
    #[must_use]
    pub fn canvas(&self) -> SharedCanvas {
        Arc::clone(&self.canvas)
    }

    /// Stop the redraw loop and discard the layer
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for OrientationOverlay {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Orientation overlay unmounted");
    }
}
