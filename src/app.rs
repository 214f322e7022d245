//! Desktop application around [`PoseCaptureView`].
//!
//! Hosts the view in an `OpenCV` HighGUI window, composites the mounted
//! layers over the camera image, and feeds device orientation from stdin.

use crate::{
    capture_view::{CaptureProps, PoseCaptureView, RenderTree},
    config::Config,
    detection::DetectionState,
    frame_source::{CameraFeed, FrameSource},
    orientation::{parse_orientation_line, DeviceOrientation},
    posenet::OnnxPoseNetLoader,
    utils::safe_cast::{dimension_to_u32, u32_to_i32},
    viewport::{HeadlessHost, ListenerId, ResizeDispatcher, ResizeListener, WindowHost},
    Error, Result,
};
use log::{debug, info, warn};
use opencv::{
    core::{Mat, Point, Scalar, Size, CV_8UC3},
    highgui::{self, WINDOW_NORMAL},
    imgproc::{self, InterpolationFlags, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Display refresh period of the application loop
const DISPLAY_FRAME_MS: u64 = 33;

/// GUI display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiMode {
    /// Show the capture window
    Window,
    /// No window; camera and keypoint layers stay unmounted
    None,
}

impl std::str::FromStr for GuiMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "window" => Ok(Self::Window),
            "none" => Ok(Self::None),
            other => Err(Error::InvalidInput(format!(
                "Unknown GUI mode '{other}' (expected window or none)"
            ))),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config: Config,
    pub gui_mode: GuiMode,
    /// Initial state of the orientation permission
    pub permission_granted: bool,
}

/// [`WindowHost`] backed by a HighGUI window.
///
/// HighGUI has no resize callback, so [`HighGuiHost::poll`] compares the
/// window's image rectangle with the last known size and dispatches a resize
/// event when it changed.
pub struct HighGuiHost {
    window: String,
    dispatcher: ResizeDispatcher,
    size: Mutex<Option<(u32, u32)>>,
}

impl HighGuiHost {
    /// Create the window
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be created
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        highgui::named_window(title, WINDOW_NORMAL)?;
        highgui::resize_window(title, u32_to_i32(width)?, u32_to_i32(height)?)?;
        Ok(Self {
            window: title.to_string(),
            dispatcher: ResizeDispatcher::new(),
            size: Mutex::new(Some((width, height))),
        })
    }

    #[must_use]
    pub fn window_name(&self) -> &str {
        &self.window
    }

    /// Check the window size and notify listeners if it changed
    ///
    /// # Errors
    ///
    /// Returns an error if the window geometry cannot be queried
    pub fn poll(&self) -> Result<()> {
        let rect = highgui::get_window_image_rect(&self.window)?;
        let (Ok(width), Ok(height)) = (u32::try_from(rect.width), u32::try_from(rect.height)) else {
            return Ok(());
        };
        if width == 0 || height == 0 {
            return Ok(());
        }
        let changed = {
            let mut size = self.size.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = *size != Some((width, height));
            *size = Some((width, height));
            changed
        };
        if changed {
            debug!("Window resized to {}x{}", width, height);
            self.dispatcher.dispatch(width, height);
        }
        Ok(())
    }
}

impl WindowHost for HighGuiHost {
    fn has_windowing(&self) -> bool {
        true
    }

    fn inner_size(&self) -> Option<(u32, u32)> {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_resize_listener(&self, listener: ResizeListener) -> ListenerId {
        self.dispatcher.add(listener)
    }

    fn remove_resize_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove(id)
    }
}

/// The pose capture desktop application
pub struct PoseCaptureApp {
    config: AppConfig,
    window: Option<Arc<HighGuiHost>>,
    feed: Arc<CameraFeed>,
    view: PoseCaptureView<OnnxPoseNetLoader>,
    orientation_tx: Arc<watch::Sender<DeviceOrientation>>,
}

impl PoseCaptureApp {
    /// Create the application
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be created
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing pose capture application");

        let window = match config.gui_mode {
            GuiMode::Window => Some(Arc::new(HighGuiHost::new(
                &config.config.display.window_title,
                config.config.display.window_width,
                config.config.display.window_height,
            )?)),
            GuiMode::None => None,
        };
        let host: Arc<dyn WindowHost> = match &window {
            Some(window) => Arc::clone(window) as Arc<dyn WindowHost>,
            None => Arc::new(HeadlessHost),
        };

        let feed = Arc::new(CameraFeed::new(config.config.camera_settings()));
        let loader = OnnxPoseNetLoader::new(&config.config.model.posenet);
        let (orientation_tx, orientation_rx) = watch::channel(DeviceOrientation::default());

        let mut props = CaptureProps::new(orientation_rx, config.permission_granted);
        props.overlay = config.config.overlay_settings();

        let frames: Arc<dyn FrameSource> = Arc::clone(&feed) as Arc<dyn FrameSource>;
        let view = PoseCaptureView::new(host, loader, frames, props);

        Ok(Self {
            config,
            window,
            feed,
            view,
            orientation_tx: Arc::new(orientation_tx),
        })
    }

    /// Run the application until the user quits or the process is interrupted.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or window handling fails
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting main application loop");
        let stdin_task = tokio::spawn(read_orientation(Arc::clone(&self.orientation_tx)));
        self.view.activate();

        let mut ticker = tokio::time::interval(Duration::from_millis(DISPLAY_FRAME_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_status = DetectionState::Idle;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }

            if let Some(window) = &self.window {
                window.poll()?;
            }
            let tree = self.view.render()?;
            if tree.status != last_status {
                info!("Detection status: {:?}", tree.status);
                last_status = tree.status.clone();
            }

            if let Some(window) = self.window.clone() {
                let frame = self.compose(&tree)?;
                highgui::imshow(window.window_name(), &frame)?;
                if !self.handle_key(highgui::wait_key(1)?, &frame) {
                    break;
                }
            }
        }

        stdin_task.abort();
        self.view.deactivate();
        if self.window.is_some() {
            highgui::destroy_all_windows()?;
        }
        info!("Application shutting down");
        Ok(())
    }

    /// Returns `false` when the user asked to quit
    fn handle_key(&mut self, key: i32, frame: &Mat) -> bool {
        if key == 27 || key == i32::from(b'q') {
            info!("Exit requested by user");
            return false;
        }
        if key == i32::from(b'p') {
            let granted = !self.view.permission_granted();
            info!("Orientation permission {}", if granted { "granted" } else { "revoked" });
            self.view.set_permission_granted(granted);
        } else if key == i32::from(b's') {
            match save_screenshot(frame, &self.config.config.display.screenshot_dir) {
                Ok(path) => info!("Screenshot saved to {}", path.display()),
                Err(e) => warn!("Failed to save screenshot: {}", e),
            }
        }
        true
    }

    /// Draw all mounted layers into one BGR image
    fn compose(&self, tree: &RenderTree) -> Result<Mat> {
        let display = &self.config.config.display;
        let (width, height) = tree
            .video
            .as_ref()
            .map_or((display.window_width, display.window_height), |v| (v.width, v.height));
        let size = Size::new(u32_to_i32(width)?, u32_to_i32(height)?);

        let mut frame = match (tree.video.as_ref(), self.feed.latest_frame()) {
            (Some(_), Some(video)) => {
                let mut resized = Mat::default();
                imgproc::resize(
                    &video.image,
                    &mut resized,
                    size,
                    0.0,
                    0.0,
                    InterpolationFlags::INTER_LINEAR as i32,
                )?;
                resized
            }
            _ => Mat::new_size_with_default(size, CV_8UC3, Scalar::all(0.0))?,
        };

        let layers = [tree.keypoint_canvas.as_ref(), tree.orientation.as_ref()];
        for layer in layers.into_iter().flatten() {
            let canvas = layer.canvas.lock().unwrap_or_else(PoisonError::into_inner);
            if canvas.dimensions() == (width, height) {
                canvas.composite_onto_bgr(frame.data_bytes_mut()?)?;
            }
        }

        if let Some(message) = tree.status_banner {
            imgproc::put_text(
                &mut frame,
                message,
                Point::new(10, 30),
                FONT_HERSHEY_SIMPLEX,
                0.7,
                Scalar::new(0.0, 0.0, 255.0, 0.0),
                2,
                LINE_8,
                false,
            )?;
        }
        Ok(frame)
    }
}

/// Feed `"<beta> <gamma>"` lines from stdin into the orientation channel
async fn read_orientation(tx: Arc<watch::Sender<DeviceOrientation>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match parse_orientation_line(&line) {
                Ok(orientation) => {
                    debug!("Device orientation {:?}", orientation);
                    tx.send_replace(orientation);
                }
                Err(e) => warn!("Ignoring orientation input: {}", e),
            },
            Ok(None) => {
                debug!("Orientation input closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read orientation input: {}", e);
                return;
            }
        }
    }
}

/// Save a BGR frame as a timestamped JPEG in `dir`
///
/// # Errors
///
/// Returns an error if the frame cannot be converted or written
pub fn save_screenshot(frame: &Mat, dir: &Path) -> Result<PathBuf> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let width = dimension_to_u32(rgb.cols())?;
    let height = dimension_to_u32(rgb.rows())?;
    let image = image::RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec())
        .ok_or_else(|| Error::RenderError("Frame buffer size mismatch".to_string()))?;

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let path = dir.join(format!("pose-capture-{stamp}.jpg"));
    image.save(&path)?;
    Ok(path)
}
