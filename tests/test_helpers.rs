//! Fakes for the window host, frame source and pose model used by the tests
#![allow(dead_code)]

use pose_capture::{
    frame_source::{FrameSource, FrameSourceState, VideoFrame},
    inference::{PoseModel, PoseModelLoader, PoseNetConfig},
    keypoint::{Keypoint, KeypointPart, Pose},
    viewport::{ListenerId, ResizeDispatcher, ResizeListener, WindowHost},
    Error, Result,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Window host whose size is driven by the test
pub struct FakeHost {
    windowing: bool,
    size: Mutex<Option<(u32, u32)>>,
    dispatcher: ResizeDispatcher,
}

impl FakeHost {
    pub fn new(windowing: bool, size: Option<(u32, u32)>) -> Arc<Self> {
        Arc::new(Self {
            windowing,
            size: Mutex::new(size),
            dispatcher: ResizeDispatcher::new(),
        })
    }

    /// Change the size and fire a resize event
    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock().unwrap() = Some((width, height));
        self.dispatcher.dispatch(width, height);
    }

    pub fn listener_count(&self) -> usize {
        self.dispatcher.listener_count()
    }
}

impl WindowHost for FakeHost {
    fn has_windowing(&self) -> bool {
        self.windowing
    }

    fn inner_size(&self) -> Option<(u32, u32)> {
        *self.size.lock().unwrap()
    }

    fn add_resize_listener(&self, listener: ResizeListener) -> ListenerId {
        self.dispatcher.add(listener)
    }

    fn remove_resize_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove(id)
    }
}

/// Frame source whose state and frame are set by the test
#[derive(Default)]
pub struct FakeFrameSource {
    state: Mutex<FrameSourceState>,
    frame: Mutex<Option<VideoFrame>>,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
}

impl FakeFrameSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, state: FrameSourceState) {
        *self.state.lock().unwrap() = state;
    }

    /// Deliver a blank frame of the given size and mark the source ready
    pub fn deliver(&self, width: u32, height: u32) {
        *self.frame.lock().unwrap() = Some(VideoFrame::blank(width, height).unwrap());
        self.set_state(FrameSourceState::Ready);
    }
}

impl FrameSource for FakeFrameSource {
    fn state(&self) -> FrameSourceState {
        self.state.lock().unwrap().clone()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.frame.lock().unwrap().clone()
    }

    fn acquire(&self) -> Result<()> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state == FrameSourceState::NotAcquired {
            *state = FrameSourceState::Acquiring;
        }
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.set_state(FrameSourceState::NotAcquired);
    }
}

/// Counters shared between a test and its fake model
#[derive(Clone, Default)]
pub struct ModelProbe {
    pub loads: Arc<AtomicUsize>,
    pub estimates: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub fail_estimates: Arc<AtomicBool>,
}

impl ModelProbe {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn estimates(&self) -> usize {
        self.estimates.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Model returning a fixed pose after an optional latency
pub struct FakeModel {
    pose: Pose,
    latency: Duration,
    probe: ModelProbe,
}

impl PoseModel for FakeModel {
    fn estimate_single_pose(&self, _frame: VideoFrame) -> impl Future<Output = Result<Pose>> + Send {
        let pose = self.pose.clone();
        let latency = self.latency;
        let probe = self.probe.clone();
        async move {
            probe.estimates.fetch_add(1, Ordering::SeqCst);
            let now = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            if probe.fail_estimates.load(Ordering::SeqCst) {
                Err(Error::ModelError("inference failed".to_string()))
            } else {
                Ok(pose)
            }
        }
    }
}

/// Loader producing a [`FakeModel`]
#[derive(Clone)]
pub struct FakeLoader {
    pub pose: Pose,
    pub latency: Duration,
    pub load_delay: Duration,
    pub fail_load: bool,
    pub probe: ModelProbe,
}

impl FakeLoader {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            latency: Duration::ZERO,
            load_delay: Duration::ZERO,
            fail_load: false,
            probe: ModelProbe::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::new(Pose::default())
        }
    }
}

impl PoseModelLoader for FakeLoader {
    type Model = FakeModel;

    fn load(&self, _config: PoseNetConfig) -> impl Future<Output = Result<FakeModel>> + Send {
        let loader = self.clone();
        async move {
            loader.probe.loads.fetch_add(1, Ordering::SeqCst);
            if !loader.load_delay.is_zero() {
                tokio::time::sleep(loader.load_delay).await;
            }
            if loader.fail_load {
                return Err(Error::ModelError("model backend unavailable".to_string()));
            }
            Ok(FakeModel {
                pose: loader.pose,
                latency: loader.latency,
                probe: loader.probe,
            })
        }
    }
}

/// Pose with the given `(x, y, score)` for the first parts; the rest score 0
pub fn synthetic_pose(points: &[(f32, f32, f32)]) -> Pose {
    let keypoints = KeypointPart::ALL.map(|part| {
        let (x, y, score) = points.get(part as usize).copied().unwrap_or((0.0, 0.0, 0.0));
        Keypoint::new(part, x, y, score)
    });
    Pose::new(keypoints)
}
