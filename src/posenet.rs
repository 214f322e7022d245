//! `PoseNet` `MobileNetV1` backend on ONNX Runtime.
//!
//! The network outputs a heatmap tensor (one channel per part) and an offset
//! tensor (y offsets in channels `0..17`, x offsets in `17..34`). Single-pose
//! decoding takes the strongest heatmap cell per part and refines it with the
//! offset vector.

use crate::{
    constants::{IMAGE_NORMALIZATION_OFFSET, IMAGE_NORMALIZATION_SCALE, NUM_KEYPOINTS},
    frame_source::VideoFrame,
    inference::{PoseModel, PoseModelLoader, PoseNetConfig},
    keypoint::{Keypoint, KeypointPart, Pose},
    utils::{image_conversion::mat_to_array3_f32, safe_cast::usize_to_i32},
    Error, Result,
};
use ndarray::{Array3, Array4, ArrayView3, ArrayViewD, Axis, CowArray, Ix3};
use opencv::core::{Mat, Size, CV_32F};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use ort::{Environment, Session, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const OFFSET_CHANNELS: usize = NUM_KEYPOINTS * 2;

/// Loads a `PoseNet` ONNX export from disk
#[derive(Debug, Clone)]
pub struct OnnxPoseNetLoader {
    model_path: PathBuf,
}

impl OnnxPoseNetLoader {
    #[must_use]
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
        }
    }
}

impl PoseModelLoader for OnnxPoseNetLoader {
    type Model = OnnxPoseNet;

    fn load(&self, config: PoseNetConfig) -> impl Future<Output = Result<OnnxPoseNet>> + Send {
        let path = self.model_path.clone();
        async move {
            tokio::task::spawn_blocking(move || OnnxPoseNet::from_file(path, config))
                .await
                .map_err(|e| Error::ModelError(format!("Model loading task failed: {e}")))?
        }
    }
}

/// A loaded `PoseNet` session
pub struct OnnxPoseNet {
    session: Arc<Mutex<Session>>,
    config: PoseNetConfig,
}

impl OnnxPoseNet {
    /// Create a session from an ONNX model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model file does not exist
    /// - The ONNX runtime environment cannot be created
    /// - The model has no input or fewer than two outputs
    pub fn from_file<P: AsRef<Path>>(model_path: P, config: PoseNetConfig) -> Result<Self> {
        let model_path = model_path.as_ref();
        log::info!("Initializing PoseNet with model: {}", model_path.display());
        if !model_path.exists() {
            return Err(Error::ModelError(format!(
                "PoseNet model not found: {}",
                model_path.display()
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("posenet")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.inputs.is_empty() {
            return Err(Error::ModelInputError("Model has no inputs".to_string()));
        }
        if session.outputs.len() < 2 {
            return Err(Error::ModelOutputError(format!(
                "Expected heatmap and offset outputs, model has {}",
                session.outputs.len()
            )));
        }

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            config,
        })
    }

    fn run(session: &Session, input: Array4<f32>) -> Result<(Array3<f32>, Array3<f32>)> {
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(session.allocator(), &cow_array)?;
        let outputs = session.run(vec![input_tensor])?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for output in &outputs {
            tensors.push(output.try_extract::<f32>()?.view().to_owned());
        }

        // A 17x17 grid makes the heatmap layout ambiguous; the offsets are not
        let layout = tensors
            .iter()
            .find_map(|t| OutputLayout::detect(t.shape()))
            .ok_or_else(|| Error::ModelOutputError("Model has no 34-channel offset output".to_string()))?;

        let mut heatmaps = None;
        let mut offsets = None;
        for tensor in &tensors {
            match to_hwc(&tensor.view(), layout) {
                Some(array) if array.dim().2 == NUM_KEYPOINTS => heatmaps = Some(array),
                Some(array) if array.dim().2 == OFFSET_CHANNELS => offsets = Some(array),
                _ => {}
            }
        }

        match (heatmaps, offsets) {
            (Some(h), Some(o)) => Ok((h, o)),
            _ => Err(Error::ModelOutputError(
                "Model did not produce heatmap and offset tensors".to_string(),
            )),
        }
    }
}

impl PoseModel for OnnxPoseNet {
    fn estimate_single_pose(&self, frame: VideoFrame) -> impl Future<Output = Result<Pose>> + Send {
        let session = Arc::clone(&self.session);
        let config = self.config;
        async move {
            tokio::task::spawn_blocking(move || {
                let input = preprocess_for_posenet(&frame.image, config.input_resolution)?;
                let (heatmaps, offsets) = {
                    let session = session.lock().unwrap_or_else(PoisonError::into_inner);
                    Self::run(&session, input)?
                };
                decode_single_pose(
                    heatmaps.view(),
                    offsets.view(),
                    config.output_stride,
                    config.input_resolution,
                    frame.dimensions(),
                )
            })
            .await
            .map_err(|e| Error::ModelError(format!("Inference task failed: {e}")))?
        }
    }
}

/// Memory layout of the network outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputLayout {
    Nhwc,
    Nchw,
}

impl OutputLayout {
    /// Identify the layout from the offset tensor's shape
    fn detect(shape: &[usize]) -> Option<Self> {
        match *shape {
            [1, _, _, c] if c == OFFSET_CHANNELS => Some(Self::Nhwc),
            [1, c, _, _] if c == OFFSET_CHANNELS => Some(Self::Nchw),
            _ => None,
        }
    }
}

/// Convert a single-batch output into `H x W x C`
fn to_hwc(view: &ArrayViewD<'_, f32>, layout: OutputLayout) -> Option<Array3<f32>> {
    if view.ndim() != 4 || view.shape()[0] != 1 {
        return None;
    }
    let single = view.index_axis(Axis(0), 0).into_dimensionality::<Ix3>().ok()?;
    Some(match layout {
        OutputLayout::Nhwc => single.to_owned(),
        OutputLayout::Nchw => single.permuted_axes([1, 2, 0]).to_owned(),
    })
}

/// Resize, convert to RGB and normalize a BGR frame to `[-1, 1]`
///
/// Output shape is `[1, resolution, resolution, 3]`.
///
/// # Errors
///
/// Returns an error if the frame is empty or an `OpenCV` operation fails
pub fn preprocess_for_posenet(image: &Mat, resolution: usize) -> Result<Array4<f32>> {
    if image.empty() {
        return Err(Error::InvalidInput("Cannot preprocess an empty frame".to_string()));
    }
    let side = usize_to_i32(resolution)?;

    let mut resized = Mat::default();
    imgproc::resize(
        image,
        &mut resized,
        Size::new(side, side),
        0.0,
        0.0,
        InterpolationFlags::INTER_LINEAR as i32,
    )?;

    let mut rgb_image = Mat::default();
    imgproc::cvt_color(&resized, &mut rgb_image, imgproc::COLOR_BGR2RGB, 0)?;

    let mut float_image = Mat::default();
    rgb_image.convert_to(
        &mut float_image,
        CV_32F,
        1.0 / f64::from(IMAGE_NORMALIZATION_SCALE),
        -f64::from(IMAGE_NORMALIZATION_OFFSET),
    )?;

    Ok(mat_to_array3_f32(&float_image)?.insert_axis(Axis(0)))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode the single best pose from heatmap logits and offsets.
///
/// `heatmaps` is `H x W x 17`, `offsets` is `H x W x 34`. Positions are
/// returned in the pixel space of a frame of size `frame_size`.
///
/// # Errors
///
/// Returns an error if the tensor shapes do not match each other
#[allow(clippy::cast_precision_loss)]
pub fn decode_single_pose(
    heatmaps: ArrayView3<'_, f32>,
    offsets: ArrayView3<'_, f32>,
    output_stride: usize,
    input_resolution: usize,
    frame_size: (u32, u32),
) -> Result<Pose> {
    let (height, width, parts) = heatmaps.dim();
    if parts != NUM_KEYPOINTS {
        return Err(Error::ModelDataFormatError(format!(
            "Expected {NUM_KEYPOINTS} heatmap channels, got {parts}"
        )));
    }
    if offsets.dim() != (height, width, OFFSET_CHANNELS) {
        return Err(Error::ModelDataFormatError(format!(
            "Offset shape {:?} does not match heatmap grid {}x{}",
            offsets.dim(),
            height,
            width
        )));
    }
    if height == 0 || width == 0 || input_resolution == 0 {
        return Err(Error::ModelDataFormatError("Empty heatmap grid".to_string()));
    }

    let scale_x = frame_size.0 as f32 / input_resolution as f32;
    let scale_y = frame_size.1 as f32 / input_resolution as f32;
    let stride = output_stride as f32;

    let keypoints = KeypointPart::ALL.map(|part| {
        let k = part as usize;
        let mut best = (0, 0, f32::NEG_INFINITY);
        for y in 0..height {
            for x in 0..width {
                let value = heatmaps[[y, x, k]];
                if value > best.2 {
                    best = (y, x, value);
                }
            }
        }
        let (hy, hx, logit) = best;
        let py = hy as f32 * stride + offsets[[hy, hx, k]];
        let px = hx as f32 * stride + offsets[[hy, hx, k + NUM_KEYPOINTS]];
        Keypoint::new(
            part,
            (px * scale_x).clamp(0.0, frame_size.0 as f32),
            (py * scale_y).clamp(0.0, frame_size.1 as f32),
            sigmoid(logit),
        )
    });

    Ok(Pose::new(keypoints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{POSENET_INPUT_RESOLUTION, POSENET_OUTPUT_RESOLUTION, POSENET_OUTPUT_STRIDE};
    use ndarray::{Array3, ArrayD, IxDyn};

    fn empty_outputs() -> (Array3<f32>, Array3<f32>) {
        let n = POSENET_OUTPUT_RESOLUTION;
        (
            Array3::from_elem((n, n, NUM_KEYPOINTS), -10.0),
            Array3::zeros((n, n, OFFSET_CHANNELS)),
        )
    }

    #[test]
    fn test_decode_picks_heatmap_peak() {
        let (mut heatmaps, mut offsets) = empty_outputs();
        let nose = KeypointPart::Nose as usize;
        heatmaps[[4, 8, nose]] = 3.0;
        offsets[[4, 8, nose]] = 2.0; // y
        offsets[[4, 8, nose + NUM_KEYPOINTS]] = -1.0; // x

        let pose = decode_single_pose(
            heatmaps.view(),
            offsets.view(),
            POSENET_OUTPUT_STRIDE,
            POSENET_INPUT_RESOLUTION,
            (257, 257),
        )
        .unwrap();

        let kp = pose.get(KeypointPart::Nose);
        assert!((kp.position.y - (4.0 * 16.0 + 2.0)).abs() < 1e-4);
        assert!((kp.position.x - (8.0 * 16.0 - 1.0)).abs() < 1e-4);
        assert!(kp.score > 0.95);
        assert!(pose.get(KeypointPart::LeftEye).score < 0.01);
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let (mut heatmaps, offsets) = empty_outputs();
        heatmaps[[16, 16, KeypointPart::RightAnkle as usize]] = 5.0;
        let pose = decode_single_pose(heatmaps.view(), offsets.view(), 16, 257, (514, 1028)).unwrap();
        let kp = pose.get(KeypointPart::RightAnkle);
        assert!((kp.position.x - 512.0).abs() < 1e-3);
        assert!((kp.position.y - 1024.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_mismatched_shapes() {
        let heatmaps = Array3::<f32>::zeros((17, 17, NUM_KEYPOINTS));
        let offsets = Array3::<f32>::zeros((9, 9, OFFSET_CHANNELS));
        let result = decode_single_pose(heatmaps.view(), offsets.view(), 16, 257, (640, 480));
        assert!(matches!(result, Err(Error::ModelDataFormatError(_))));

        let heatmaps = Array3::<f32>::zeros((17, 17, 5));
        let offsets = Array3::<f32>::zeros((17, 17, OFFSET_CHANNELS));
        assert!(decode_single_pose(heatmaps.view(), offsets.view(), 16, 257, (640, 480)).is_err());
    }

    #[test]
    fn test_layout_detection() {
        assert_eq!(OutputLayout::detect(&[1, 17, 17, 34]), Some(OutputLayout::Nhwc));
        assert_eq!(OutputLayout::detect(&[1, 34, 17, 17]), Some(OutputLayout::Nchw));
        // Heatmaps alone are ambiguous on a 17x17 grid
        assert_eq!(OutputLayout::detect(&[1, 17, 17, 17]), None);
        assert_eq!(OutputLayout::detect(&[34, 17, 17]), None);
    }

    #[test]
    fn test_to_hwc_layouts() {
        let nhwc = ArrayD::<f32>::zeros(IxDyn(&[1, 9, 11, 17]));
        assert_eq!(to_hwc(&nhwc.view(), OutputLayout::Nhwc).unwrap().dim(), (9, 11, 17));

        let mut nchw = ArrayD::<f32>::zeros(IxDyn(&[1, 34, 9, 11]));
        nchw[[0, 20, 3, 4]] = 7.0;
        let hwc = to_hwc(&nchw.view(), OutputLayout::Nchw).unwrap();
        assert_eq!(hwc.dim(), (9, 11, 34));
        assert_eq!(hwc[[3, 4, 20]], 7.0);

        let batched = ArrayD::<f32>::zeros(IxDyn(&[2, 5, 5, 17]));
        assert!(to_hwc(&batched.view(), OutputLayout::Nhwc).is_none());
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = VideoFrame::blank(64, 48).unwrap();
        let tensor = preprocess_for_posenet(&frame.image, 257).unwrap();
        assert_eq!(tensor.shape(), &[1, 257, 257, 3]);
        // Black pixels normalize to -1
        assert!(tensor.iter().all(|v| (v + 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_missing_model_file() {
        let result = OnnxPoseNet::from_file("does/not/exist.onnx", PoseNetConfig::PRESET);
        assert!(matches!(result, Err(Error::ModelError(_))));
    }
}
