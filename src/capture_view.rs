//! Composition root of the capture pipeline.
//!
//! [`PoseCaptureView`] wires the viewport tracker, the frame source, the
//! inference session, the detection loop and both overlays together. Each
//! call to [`PoseCaptureView::render`] re-evaluates which layers are mounted
//! and returns a [`RenderTree`] describing them.

use crate::{
    constants::DETECTION_UNAVAILABLE_MESSAGE,
    detection::{DetectionLoop, DetectionState, DetectionTask},
    frame_source::{FrameSource, FrameSourceState},
    inference::{InferenceSession, PoseModelLoader},
    orientation::{DeviceOrientation, OrientationOverlay, OverlaySettings},
    renderer::{KeypointRenderer, PixelCanvas, SharedCanvas},
    viewport::{ViewportSize, ViewportSizeTracker, ViewportSubscription, WindowHost},
    Result,
};
use log::{debug, info};
use std::sync::{Arc, PoisonError};
use tokio::sync::watch;

/// Sizing forwarded to the outer wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WrapperStyle {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Inputs supplied by the enclosing flow
#[derive(Debug, Clone)]
pub struct CaptureProps {
    pub device_orientation: watch::Receiver<DeviceOrientation>,
    pub permission_granted: bool,
    pub wrapper: WrapperStyle,
    pub overlay: OverlaySettings,
}

impl CaptureProps {
    #[must_use]
    pub fn new(device_orientation: watch::Receiver<DeviceOrientation>, permission_granted: bool) -> Self {
        Self {
            device_orientation,
            permission_granted,
            wrapper: WrapperStyle::default(),
            overlay: OverlaySettings::default(),
        }
    }
}

/// The live video layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLayer {
    pub width: u32,
    pub height: u32,
    pub source_state: FrameSourceState,
}

/// A mounted drawing layer
#[derive(Clone)]
pub struct CanvasLayer {
    pub width: u32,
    pub height: u32,
    pub canvas: SharedCanvas,
}

impl std::fmt::Debug for CanvasLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasLayer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Layers mounted by one render pass, bottom to top
#[derive(Debug, Clone)]
pub struct RenderTree {
    pub wrapper: WrapperStyle,
    pub video: Option<VideoLayer>,
    pub keypoint_canvas: Option<CanvasLayer>,
    pub orientation: Option<CanvasLayer>,
    pub status_banner: Option<&'static str>,
    pub status: DetectionState,
}

/// Webcam view with pose keypoints and an orientation overlay
pub struct PoseCaptureView<L: PoseModelLoader> {
    host: Arc<dyn WindowHost>,
    session: Arc<InferenceSession<L>>,
    frames: Arc<dyn FrameSource>,
    props: CaptureProps,
    keypoint_canvas: SharedCanvas,
    viewport: Option<ViewportSubscription>,
    detection: Option<DetectionTask>,
    overlay: Option<OrientationOverlay>,
    started: bool,
    video_mounted: bool,
}

impl<L: PoseModelLoader> PoseCaptureView<L> {
    #[must_use]
    pub fn new(host: Arc<dyn WindowHost>, loader: L, frames: Arc<dyn FrameSource>, props: CaptureProps) -> Self {
        Self {
            host,
            session: Arc::new(InferenceSession::new(loader)),
            frames,
            props,
            keypoint_canvas: PixelCanvas::shared(0, 0),
            viewport: None,
            detection: None,
            overlay: None,
            started: false,
            video_mounted: false,
        }
    }

    /// Start tracking the viewport. Idempotent.
    pub fn activate(&mut self) {
        if self.viewport.is_none() {
            self.viewport = Some(ViewportSizeTracker::activate(Arc::clone(&self.host)));
            debug!("Capture view activated");
        }
    }

    /// Evaluate layer gating and mount or unmount layers accordingly.
    ///
    /// Activates the view if needed, so the overlays always observe the
    /// tracked viewport. Starts the detection pipeline on the first pass that
    /// mounts the video layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame source cannot begin acquiring
    pub fn render(&mut self) -> Result<RenderTree> {
        self.activate();
        let size = self.viewport_size();
        let layer_size = if self.host.has_windowing() {
            size.dimensions()
        } else {
            None
        };

        let (video, keypoint_canvas) = match layer_size {
            Some((width, height)) => {
                self.mount_video()?;
                self.start_detection();
                (
                    Some(VideoLayer {
                        width,
                        height,
                        source_state: self.frames.state(),
                    }),
                    Some(CanvasLayer {
                        width,
                        height,
                        canvas: Arc::clone(&self.keypoint_canvas),
                    }),
                )
            }
            None => (None, None),
        };

        let orientation = self.update_overlay().map(|canvas| {
            let (width, height) = size.dimensions().unwrap_or((0, 0));
            CanvasLayer { width, height, canvas }
        });

        let status = self.detection_state();
        Ok(RenderTree {
            wrapper: self.props.wrapper,
            video,
            keypoint_canvas,
            orientation,
            status_banner: status.is_unavailable().then_some(DETECTION_UNAVAILABLE_MESSAGE),
            status,
        })
    }

    fn mount_video(&mut self) -> Result<()> {
        if !self.video_mounted {
            self.frames.acquire()?;
            self.video_mounted = true;
            info!("Video layer mounted");
        }
        Ok(())
    }

    fn start_detection(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let viewport = self.viewport_receiver();
        self.detection = Some(DetectionLoop::start(
            Arc::clone(&self.session),
            Arc::clone(&self.frames),
            viewport,
            KeypointRenderer::new(Arc::clone(&self.keypoint_canvas)),
        ));
    }

    fn update_overlay(&mut self) -> Option<SharedCanvas> {
        if self.props.permission_granted {
            if self.overlay.is_none() {
                self.overlay = Some(OrientationOverlay::mount(
                    self.props.device_orientation.clone(),
                    self.viewport_receiver(),
                    self.props.overlay,
                ));
            }
        } else if let Some(overlay) = self.overlay.take() {
            overlay.unmount();
        }
        self.overlay.as_ref().map(OrientationOverlay::canvas)
    }

    fn viewport_receiver(&self) -> watch::Receiver<ViewportSize> {
        match &self.viewport {
            Some(subscription) => subscription.subscribe(),
            None => watch::channel(ViewportSize::default()).1,
        }
    }

    /// Update the permission flag; takes effect on the next render
    pub fn set_permission_granted(&mut self, granted: bool) {
        self.props.permission_granted = granted;
    }

    #[must_use]
    pub fn permission_granted(&self) -> bool {
        self.props.permission_granted
    }

    /// Last measured viewport size
    #[must_use]
    pub fn viewport_size(&self) -> ViewportSize {
        self.viewport
            .as_ref()
            .map(ViewportSubscription::current)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn detection_state(&self) -> DetectionState {
        self.detection
            .as_ref()
            .map(DetectionTask::state)
            .unwrap_or_default()
    }

    /// Whether the detection pipeline has been started in this activation
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn session(&self) -> &Arc<InferenceSession<L>> {
        &self.session
    }

    #[must_use]
    pub fn keypoint_canvas(&self) -> SharedCanvas {
        Arc::clone(&self.keypoint_canvas)
    }

    /// Tear everything down: stop detection, unmount the overlay, release the
    /// frame source and stop tracking the viewport. Idempotent.
    pub fn deactivate(&mut self) {
        if let Some(task) = self.detection.take() {
            task.stop();
        }
        if let Some(overlay) = self.overlay.take() {
            overlay.unmount();
        }
        if self.video_mounted {
            self.frames.release();
            self.video_mounted = false;
        }
        self.keypoint_canvas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(0, 0);
        if let Some(mut subscription) = self.viewport.take() {
            subscription.deactivate();
        }
        if self.started {
            info!("Capture view deactivated");
        }
        self.started = false;
    }
}

impl<L: PoseModelLoader> Drop for PoseCaptureView<L> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
