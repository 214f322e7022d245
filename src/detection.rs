//! Periodic pose detection.
//!
//! [`DetectionLoop::start`] spawns one task that loads the model and then,
//! once per [`DETECTION_INTERVAL_MS`], pulls the latest frame, estimates a
//! pose and hands it to the [`KeypointRenderer`]. The estimate is awaited
//! inside the tick and missed ticks are skipped, so estimates never overlap.

use crate::{
    constants::DETECTION_INTERVAL_MS,
    frame_source::FrameSource,
    inference::{InferenceSession, PoseModelLoader},
    renderer::KeypointRenderer,
    viewport::ViewportSize,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Observable status of the detection pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DetectionState {
    /// Not started
    #[default]
    Idle,
    /// Waiting for the model to load
    Loading,
    /// Model loaded and ticking
    Running,
    /// Last estimate failed; still ticking
    Degraded(String),
    /// The model could not be loaded; detection has ended
    Unavailable(String),
    /// Cancelled by the owner
    Stopped,
}

impl DetectionState {
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

fn set_state(tx: &watch::Sender<DetectionState>, next: DetectionState) {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            debug!("Detection state {:?} -> {:?}", current, next);
            *current = next;
            true
        }
    });
}

/// Entry point for the detection pipeline
pub struct DetectionLoop;

impl DetectionLoop {
    /// Spawn the detection task on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start<L: PoseModelLoader>(
        session: Arc<InferenceSession<L>>,
        frames: Arc<dyn FrameSource>,
        viewport: watch::Receiver<ViewportSize>,
        renderer: KeypointRenderer,
    ) -> DetectionTask {
        let (state_tx, state_rx) = watch::channel(DetectionState::Idle);
        let state_tx = Arc::new(state_tx);
        let task_state = Arc::clone(&state_tx);
        let handle = tokio::spawn(async move {
            Self::run(&session, frames.as_ref(), &viewport, &renderer, &task_state).await;
        });
        DetectionTask {
            handle,
            state_tx,
            state_rx,
        }
    }

    async fn run<L: PoseModelLoader>(
        session: &InferenceSession<L>,
        frames: &dyn FrameSource,
        viewport: &watch::Receiver<ViewportSize>,
        renderer: &KeypointRenderer,
        state: &watch::Sender<DetectionState>,
    ) {
        set_state(state, DetectionState::Loading);
        if let Err(e) = session.load().await {
            error!("Pose model failed to load: {}", e);
            set_state(state, DetectionState::Unavailable(e.to_string()));
            return;
        }
        info!("Pose detection running every {} ms", DETECTION_INTERVAL_MS);
        set_state(state, DetectionState::Running);

        let period = Duration::from_millis(DETECTION_INTERVAL_MS);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            Self::tick(session, frames, viewport, renderer, state).await;
        }
    }

    async fn tick<L: PoseModelLoader>(
        session: &InferenceSession<L>,
        frames: &dyn FrameSource,
        viewport: &watch::Receiver<ViewportSize>,
        renderer: &KeypointRenderer,
        state: &watch::Sender<DetectionState>,
    ) {
        if !viewport.borrow().is_measured() {
            debug!("Viewport not measured, skipping tick");
            return;
        }
        let source_state = frames.state();
        if !source_state.is_ready() {
            debug!("Frame source not ready ({:?}), skipping tick", source_state);
            return;
        }
        let Some(frame) = frames.latest_frame() else {
            debug!("No frame available, skipping tick");
            return;
        };

        let frame_size = frame.dimensions();
        match session.estimate(frame).await {
            Ok(pose) => {
                // The viewport may have changed while the estimate ran
                let size = viewport.borrow().dimensions();
                if let Some((width, height)) = size {
                    renderer.render(&pose.rescaled(frame_size, (width, height)), width, height);
                }
                set_state(state, DetectionState::Running);
            }
            Err(e) => {
                warn!("Pose estimation failed: {}", e);
                set_state(state, DetectionState::Degraded(e.to_string()));
            }
        }
    }
}

/// Handle to a running detection task; dropping it cancels the task
pub struct DetectionTask {
    handle: JoinHandle<()>,
    state_tx: Arc<watch::Sender<DetectionState>>,
    state_rx: watch::Receiver<DetectionState>,
}

impl DetectionTask {
    /// Current state
    #[must_use]
    pub fn state(&self) -> DetectionState {
        self.state_rx.borrow().clone()
    }

    /// Receiver observing every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.state_rx.clone()
    }

    /// Whether the task has ended (stopped, or the model failed to load)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the timer and any in-flight estimate. Idempotent.
    pub fn stop(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            info!("Pose detection stopped");
        }
        if !self.state_rx.borrow().is_unavailable() {
            set_state(&self.state_tx, DetectionState::Stopped);
        }
    }
}

impl Drop for DetectionTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
