//! Live video frame sources.
//!
//! A [`FrameSource`] reports an explicit [`FrameSourceState`] instead of
//! being probed for readiness. [`CameraFeed`] is the `OpenCV` webcam
//! implementation: it grabs frames on a dedicated thread and only ever keeps
//! the latest one.

use crate::{
    utils::safe_cast::{dimension_to_u32, u32_to_i32},
    Error, Result,
};
use log::{debug, info, warn};
use opencv::{
    core::{Mat, Scalar, CV_8UC3},
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Consecutive failed reads after which the camera is considered lost
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;

/// Lifecycle of a frame source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameSourceState {
    /// Nothing requested yet
    #[default]
    NotAcquired,
    /// Device is opening, no frame delivered yet
    Acquiring,
    /// At least one frame is available
    Ready,
    /// Device could not be opened or was lost
    Failed(String),
}

impl FrameSourceState {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// One captured BGR frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Mat,
    pub width: u32,
    pub height: u32,
    /// Increments with every frame the source delivers
    pub sequence: u64,
}

impl VideoFrame {
    /// Wrap a captured image
    ///
    /// # Errors
    ///
    /// Returns an error if the image is empty
    pub fn new(image: Mat, sequence: u64) -> Result<Self> {
        let width = dimension_to_u32(image.cols())?;
        let height = dimension_to_u32(image.rows())?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput("Empty video frame".to_string()));
        }
        Ok(Self {
            image,
            width,
            height,
            sequence,
        })
    }

    /// Black frame of the given size
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or the matrix cannot be allocated
    pub fn blank(width: u32, height: u32) -> Result<Self> {
        let rows = u32_to_i32(height)?;
        let cols = u32_to_i32(width)?;
        let image = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0))?;
        Self::new(image, 0)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A live source of video frames
pub trait FrameSource: Send + Sync + 'static {
    /// Current lifecycle state
    fn state(&self) -> FrameSourceState;

    /// Most recent frame, if any
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Start delivering frames. Called when the video layer mounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot even begin acquiring
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    /// Stop delivering frames and free the device
    fn release(&self) {}
}

/// Camera selection and capture parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub index: i32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Mirror frames horizontally
    pub flip_x: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: None,
            height: None,
            flip_x: false,
        }
    }
}

#[derive(Default)]
struct FeedShared {
    state: Mutex<FrameSourceState>,
    latest: Mutex<Option<VideoFrame>>,
    running: AtomicBool,
    sequence: AtomicU64,
}

impl FeedShared {
    fn set_state(&self, state: FrameSourceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Webcam capture running on its own thread
pub struct CameraFeed {
    settings: CameraSettings,
    shared: Arc<FeedShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CameraFeed {
    #[must_use]
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(FeedShared::default()),
            worker: Mutex::new(None),
        }
    }

    fn open_capture(settings: &CameraSettings) -> Result<VideoCapture> {
        info!("Opening camera {}", settings.index);
        let mut capture = VideoCapture::new(settings.index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::Camera(format!("Camera {} is not available", settings.index)));
        }
        if let Some(w) = settings.width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(w))?;
        }
        if let Some(h) = settings.height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(h))?;
        }
        // Keep only the newest frame in the driver queue
        capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
        info!(
            "Camera {} opened at {}x{}",
            settings.index,
            capture.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?
        );
        Ok(capture)
    }

    fn capture_loop(settings: &CameraSettings, shared: &FeedShared) {
        let mut capture = match Self::open_capture(settings) {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Failed to open camera: {}", e);
                shared.set_state(FrameSourceState::Failed(e.to_string()));
                return;
            }
        };

        let mut failures = 0;
        while shared.running.load(Ordering::Acquire) {
            match Self::read_frame(&mut capture, settings, shared) {
                Ok(frame) => {
                    failures = 0;
                    *shared.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
                    shared.set_state(FrameSourceState::Ready);
                }
                Err(e) => {
                    failures += 1;
                    debug!("Frame read failed ({}): {}", failures, e);
                    if failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        warn!("Camera stopped delivering frames");
                        shared.set_state(FrameSourceState::Failed(e.to_string()));
                        return;
                    }
                }
            }
        }
    }

    fn read_frame(capture: &mut VideoCapture, settings: &CameraSettings, shared: &FeedShared) -> Result<VideoFrame> {
        let mut frame = Mat::default();
        if !capture.read(&mut frame)? || frame.empty() {
            return Err(Error::Camera("Empty frame received".to_string()));
        }
        if settings.flip_x {
            let mut flipped = Mat::default();
            opencv::core::flip(&frame, &mut flipped, 1)?;
            frame = flipped;
        }
        let sequence = shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        VideoFrame::new(frame, sequence)
    }
}

impl FrameSource for CameraFeed {
    fn state(&self) -> FrameSourceState {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn acquire(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }

        self.shared.set_state(FrameSourceState::Acquiring);
        self.shared.running.store(true, Ordering::Release);

        let settings = self.settings.clone();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || Self::capture_loop(&settings, &shared))?;
        *worker = Some(handle);
        Ok(())
    }

    fn release(&self) {
        self.shared.running.store(false, Ordering::Release);
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Camera thread panicked");
            }
            info!("Camera released");
        }
        *self.shared.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.set_state(FrameSourceState::NotAcquired);
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_dimensions() {
        let frame = VideoFrame::blank(64, 48).unwrap();
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(frame.image.channels(), 3);
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(VideoFrame::new(Mat::default(), 0).is_err());
        assert!(VideoFrame::blank(0, 10).is_err());
    }

    #[test]
    fn test_new_feed_is_not_acquired() {
        let feed = CameraFeed::new(CameraSettings::default());
        assert_eq!(feed.state(), FrameSourceState::NotAcquired);
        assert!(feed.latest_frame().is_none());
        // Releasing an idle feed is a no-op
        feed.release();
        assert_eq!(feed.state(), FrameSourceState::NotAcquired);
    }

    #[test]
    fn test_state_readiness() {
        assert!(FrameSourceState::Ready.is_ready());
        assert!(!FrameSourceState::Acquiring.is_ready());
        assert!(!FrameSourceState::Failed("x".into()).is_ready());
    }
}
