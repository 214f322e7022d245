//! Keypoint drawing.
//!
//! Layers are plain ARGB pixel buffers ([`PixelCanvas`]) that the application
//! composites over the camera image. A fully transparent pixel is `0`.

use crate::{
    constants::{KEYPOINT_COLOR, KEYPOINT_CONFIDENCE_THRESHOLD, KEYPOINT_RADIUS},
    keypoint::{Keypoint, Pose},
    utils::safe_cast::f32_to_i32_clamp,
    Error, Result,
};
use log::debug;
use std::sync::{Arc, Mutex, PoisonError};

/// Drawing primitives the keypoint and axis routines target
pub trait DrawingContext {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Filled disc centered on `(cx, cy)`
    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: u32);

    /// One pixel wide line segment
    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: u32);
}

/// In-memory ARGB drawing surface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    buffer: Vec<u32>,
}

/// A canvas shared between the renderer and the compositor
pub type SharedCanvas = Arc<Mutex<PixelCanvas>>;

impl PixelCanvas {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffer: vec![0; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn shared(width: u32, height: u32) -> SharedCanvas {
        Arc::new(Mutex::new(Self::new(width, height)))
    }

    /// Set the pixel dimensions. Like an HTML canvas, this always clears.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.buffer.clear();
        self.buffer.resize(width as usize * height as usize, 0);
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel value, `None` outside the canvas
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.buffer[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    /// Number of non-transparent pixels
    #[must_use]
    pub fn painted_pixels(&self) -> usize {
        self.buffer.iter().filter(|&&p| p != 0).count()
    }

    #[must_use]
    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            self.buffer[y as usize * self.width as usize + x as usize] = color;
        }
    }

    /// Alpha-blend this layer over a packed BGR buffer of the same size
    ///
    /// # Errors
    ///
    /// Returns an error if `bgr` does not hold `width * height * 3` bytes
    pub fn composite_onto_bgr(&self, bgr: &mut [u8]) -> Result<()> {
        if bgr.len() != self.buffer.len() * 3 {
            return Err(Error::RenderError(format!(
                "Layer {}x{} does not match target buffer of {} bytes",
                self.width,
                self.height,
                bgr.len()
            )));
        }
        for (argb, px) in self.buffer.iter().zip(bgr.chunks_exact_mut(3)) {
            let alpha = argb >> 24;
            if alpha == 0 {
                continue;
            }
            let channels = [argb & 0xFF, (argb >> 8) & 0xFF, (argb >> 16) & 0xFF];
            for (dst, src) in px.iter_mut().zip(channels) {
                let blended = (src * alpha + u32::from(*dst) * (255 - alpha)) / 255;
                *dst = u8::try_from(blended).unwrap_or(u8::MAX);
            }
        }
        Ok(())
    }
}

impl DrawingContext for PixelCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: u32) {
        let cx = f32_to_i32_clamp(cx.round(), i32::MIN / 2, i32::MAX / 2);
        let cy = f32_to_i32_clamp(cy.round(), i32::MIN / 2, i32::MAX / 2);
        let r = f32_to_i32_clamp(radius.round(), 0, 4096);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: u32) {
        let bound = 1 << 20;
        let (mut x, mut y) = (
            f32_to_i32_clamp(from.0.round(), -bound, bound),
            f32_to_i32_clamp(from.1.round(), -bound, bound),
        );
        let (x1, y1) = (
            f32_to_i32_clamp(to.0.round(), -bound, bound),
            f32_to_i32_clamp(to.1.round(), -bound, bound),
        );
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let sx = if x < x1 { 1 } else { -1 };
        let sy = if y < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// Draw one marker per keypoint scoring strictly above `min_confidence`.
///
/// Returns the number of markers drawn.
pub fn draw_keypoints<C: DrawingContext + ?Sized>(
    keypoints: &[Keypoint],
    min_confidence: f32,
    ctx: &mut C,
) -> usize {
    let mut drawn = 0;
    for keypoint in keypoints.iter().filter(|k| k.exceeds(min_confidence)) {
        ctx.fill_circle(
            keypoint.position.x,
            keypoint.position.y,
            KEYPOINT_RADIUS,
            KEYPOINT_COLOR,
        );
        drawn += 1;
    }
    drawn
}

/// Draws the latest pose onto the keypoint layer
#[derive(Clone)]
pub struct KeypointRenderer {
    canvas: SharedCanvas,
}

impl KeypointRenderer {
    #[must_use]
    pub fn new(canvas: SharedCanvas) -> Self {
        Self { canvas }
    }

    #[must_use]
    pub fn canvas(&self) -> SharedCanvas {
        Arc::clone(&self.canvas)
    }

    /// Size the layer to `width x height`, clearing it, then draw `pose`
    pub fn render(&self, pose: &Pose, width: u32, height: u32) {
        let mut canvas = self.canvas.lock().unwrap_or_else(PoisonError::into_inner);
        canvas.resize(width, height);
        let drawn = draw_keypoints(&pose.keypoints, KEYPOINT_CONFIDENCE_THRESHOLD, &mut *canvas);
        debug!("Rendered {} keypoints on {}x{} layer", drawn, width, height);
    }
}
