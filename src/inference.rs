//! Pose model lifecycle.
//!
//! The model is an asynchronous service: a [`PoseModelLoader`] produces a
//! [`PoseModel`] handle once, and the handle then answers any number of
//! single-pose estimate requests. [`InferenceSession`] guarantees the load
//! happens at most once.

use crate::{
    constants::{POSENET_INPUT_RESOLUTION, POSENET_MULTIPLIER, POSENET_OUTPUT_STRIDE},
    frame_source::VideoFrame,
    keypoint::Pose,
    Error, Result,
};
use log::info;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Backbone architecture of the pose network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    MobileNetV1,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MobileNetV1 => write!(f, "MobileNetV1"),
        }
    }
}

/// Model load parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseNetConfig {
    pub architecture: Architecture,
    pub output_stride: usize,
    pub input_resolution: usize,
    pub multiplier: f32,
}

impl PoseNetConfig {
    /// The small/fast preset used for interactive frame rates
    pub const PRESET: Self = Self {
        architecture: Architecture::MobileNetV1,
        output_stride: POSENET_OUTPUT_STRIDE,
        input_resolution: POSENET_INPUT_RESOLUTION,
        multiplier: POSENET_MULTIPLIER,
    };

    /// Side of the heatmap grid produced for this configuration
    #[must_use]
    pub fn output_resolution(&self) -> usize {
        (self.input_resolution - 1) / self.output_stride + 1
    }
}

/// A loaded pose estimation model
pub trait PoseModel: Send + Sync + 'static {
    /// Estimate the single best pose in `frame`, in the frame's pixel space
    fn estimate_single_pose(&self, frame: VideoFrame) -> impl Future<Output = Result<Pose>> + Send;
}

/// Asynchronous factory for a [`PoseModel`]
pub trait PoseModelLoader: Send + Sync + 'static {
    type Model: PoseModel;

    /// Load the model with the given configuration
    fn load(&self, config: PoseNetConfig) -> impl Future<Output = Result<Self::Model>> + Send;
}

/// Owns the single model handle for one capture view
pub struct InferenceSession<L: PoseModelLoader> {
    loader: L,
    config: PoseNetConfig,
    model: OnceCell<Arc<L::Model>>,
}

impl<L: PoseModelLoader> InferenceSession<L> {
    /// Create a session using the fixed preset
    #[must_use]
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            config: PoseNetConfig::PRESET,
            model: OnceCell::new(),
        }
    }

    /// Load the model, or return the already loaded handle.
    ///
    /// Concurrent callers share one load. A failed load leaves the session
    /// unloaded.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if loading fails
    pub async fn load(&self) -> Result<Arc<L::Model>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!(
                    "Loading pose model ({}, stride {}, input {}, multiplier {})",
                    self.config.architecture,
                    self.config.output_stride,
                    self.config.input_resolution,
                    self.config.multiplier
                );
                self.loader.load(self.config).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(model))
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Estimate a single pose with the loaded model
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelNotLoaded`] before a successful [`load`](Self::load),
    /// or the model's error if inference fails
    pub async fn estimate(&self, frame: VideoFrame) -> Result<Pose> {
        let model = self.model.get().ok_or(Error::ModelNotLoaded)?;
        model.estimate_single_pose(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstModel;

    impl PoseModel for ConstModel {
        fn estimate_single_pose(&self, _frame: VideoFrame) -> impl Future<Output = Result<Pose>> + Send {
            async { Ok(Pose::default()) }
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PoseModelLoader for CountingLoader {
        type Model = ConstModel;

        fn load(&self, config: PoseNetConfig) -> impl Future<Output = Result<ConstModel>> + Send {
            let loads = Arc::clone(&self.loads);
            let fail = self.fail;
            async move {
                assert_eq!(config, PoseNetConfig::PRESET);
                loads.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(Error::ModelError("no accelerator".into()))
                } else {
                    Ok(ConstModel)
                }
            }
        }
    }

    #[test]
    fn test_preset_values() {
        let preset = PoseNetConfig::PRESET;
        assert_eq!(preset.architecture, Architecture::MobileNetV1);
        assert_eq!(preset.output_stride, 16);
        assert_eq!(preset.input_resolution, 257);
        assert!((preset.multiplier - 0.75).abs() < f32::EPSILON);
        assert_eq!(preset.output_resolution(), 17);
    }

    #[tokio::test]
    async fn test_loads_once() {
        let loader = CountingLoader::default();
        let loads = Arc::clone(&loader.loads);
        let session = InferenceSession::new(loader);

        let first = session.load().await.unwrap();
        let second = session.load().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(session.is_loaded());
    }

    #[tokio::test]
    async fn test_estimate_before_load() {
        let session = InferenceSession::new(CountingLoader::default());
        let frame = VideoFrame::blank(8, 8).unwrap();
        assert!(matches!(session.estimate(frame).await, Err(Error::ModelNotLoaded)));
    }

    #[tokio::test]
    async fn test_failed_load_stays_unloaded() {
        let session = InferenceSession::new(CountingLoader {
            fail: true,
            ..CountingLoader::default()
        });
        assert!(session.load().await.is_err());
        assert!(!session.is_loaded());
    }
}
