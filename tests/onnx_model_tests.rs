//! Tests for PoseNet ONNX model loading and inference

use pose_capture::{
    constants::NUM_KEYPOINTS,
    frame_source::VideoFrame,
    inference::{InferenceSession, PoseModel, PoseNetConfig},
    posenet::{OnnxPoseNet, OnnxPoseNetLoader},
    Error, Result,
};
use opencv::{core::Size, imgcodecs, imgproc, prelude::*};
use std::path::Path;

const MODEL_PATH: &str = "assets/posenet_mobilenet_v1_075.onnx";

#[tokio::test]
async fn test_missing_model_is_reported() {
    let session = InferenceSession::new(OnnxPoseNetLoader::new("assets/missing.onnx"));
    assert!(matches!(session.load().await, Err(Error::ModelError(_))));
    assert!(!session.is_loaded());
}

#[test]
#[ignore = "Requires ONNX model"]
fn test_load_posenet_model() -> Result<()> {
    assert!(Path::new(MODEL_PATH).exists(), "PoseNet model not found");

    let _model = OnnxPoseNet::from_file(MODEL_PATH, PoseNetConfig::PRESET)?;
    // If construction succeeds, the graph has the expected inputs and outputs

    Ok(())
}

#[tokio::test]
#[ignore = "Requires ONNX model"]
async fn test_estimate_on_blank_frame() -> Result<()> {
    let session = InferenceSession::new(OnnxPoseNetLoader::new(MODEL_PATH));
    let model = session.load().await?;

    let frame = VideoFrame::blank(640, 480)?;
    let pose = model.estimate_single_pose(frame).await?;
    assert_eq!(pose.keypoints.len(), NUM_KEYPOINTS);
    for keypoint in &pose.keypoints {
        assert!((0.0..=1.0).contains(&keypoint.score));
        assert!((0.0..=640.0).contains(&keypoint.position.x));
        assert!((0.0..=480.0).contains(&keypoint.position.y));
    }
    Ok(())
}

#[tokio::test]
#[ignore = "Requires ONNX model and test image"]
async fn test_estimate_on_person_image() -> Result<()> {
    let image = imgcodecs::imread("assets/person.jpg", imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        return Err(Error::InvalidInput("assets/person.jpg not found".to_string()));
    }
    let mut resized = Mat::default();
    imgproc::resize(&image, &mut resized, Size::new(640, 480), 0.0, 0.0, imgproc::INTER_LINEAR)?;

    let session = InferenceSession::new(OnnxPoseNetLoader::new(MODEL_PATH));
    session.load().await?;
    let pose = session.estimate(VideoFrame::new(resized, 1)?).await?;

    // A visible person yields at least a few confident keypoints
    let confident = pose.keypoints.iter().filter(|k| k.exceeds(0.4)).count();
    assert!(confident >= 5, "only {confident} confident keypoints");
    Ok(())
}
