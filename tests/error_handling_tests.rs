//! Error handling tests for all modules

mod test_helpers;

use pose_capture::{
    error::{Error, Result},
    frame_source::VideoFrame,
    inference::InferenceSession,
    orientation::parse_orientation_line,
    posenet::{decode_single_pose, preprocess_for_posenet},
    renderer::PixelCanvas,
    utils::{image_conversion::mat_to_array3_f32, safe_cast::*},
};
use ndarray::Array3;
use opencv::core::Mat;
use test_helpers::{synthetic_pose, FakeLoader};

#[test]
fn test_error_messages() {
    assert_eq!(Error::ModelNotLoaded.to_string(), "Pose model is not loaded");
    assert_eq!(
        Error::Camera("Camera 3 is not available".into()).to_string(),
        "Camera error: Camera 3 is not available"
    );
    let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(io, Error::Io(_)));
}

#[tokio::test]
async fn test_estimate_before_load_fails() {
    let session = InferenceSession::new(FakeLoader::new(synthetic_pose(&[])));
    let frame = VideoFrame::blank(16, 16).unwrap();
    assert!(matches!(session.estimate(frame).await, Err(Error::ModelNotLoaded)));
}

#[tokio::test]
async fn test_failed_load_can_be_retried() {
    let loader = FakeLoader::failing();
    let probe = loader.probe.clone();
    let session = InferenceSession::new(loader);
    assert!(matches!(session.load().await, Err(Error::ModelError(_))));
    assert!(session.load().await.is_err());
    // A failed load does not poison the session
    assert_eq!(probe.loads(), 2);
}

#[test]
fn test_empty_frames_rejected() -> Result<()> {
    assert!(matches!(VideoFrame::new(Mat::default(), 1), Err(Error::InvalidInput(_))));
    assert!(preprocess_for_posenet(&Mat::default(), 257).is_err());
    assert!(mat_to_array3_f32(&Mat::default()).is_err());
    let frame = VideoFrame::blank(4, 4)?;
    assert_eq!(frame.sequence, 0);
    Ok(())
}

#[test]
fn test_decode_rejects_bad_tensors() {
    let heatmaps = Array3::<f32>::zeros((0, 0, 17));
    let offsets = Array3::<f32>::zeros((0, 0, 34));
    assert!(matches!(
        decode_single_pose(heatmaps.view(), offsets.view(), 16, 257, (640, 480)),
        Err(Error::ModelDataFormatError(_))
    ));
}

#[test]
fn test_orientation_input_errors() {
    for line in ["", "12", "a b", "1 2 3", "inf 0"] {
        assert!(
            matches!(parse_orientation_line(line), Err(Error::InvalidInput(_))),
            "line {line:?} should be rejected"
        );
    }
}

#[test]
fn test_layer_composite_size_mismatch() {
    let canvas = PixelCanvas::new(4, 4);
    let mut too_small = vec![0u8; 4 * 4 * 3 - 1];
    assert!(matches!(
        canvas.composite_onto_bgr(&mut too_small),
        Err(Error::RenderError(_))
    ));
}

#[test]
fn test_safe_cast_errors() {
    assert!(u32_to_i32(u32::MAX).is_err());
    assert!(dimension_to_u32(-5).is_err());
    assert_eq!(f32_to_i32_clamp(f32::NAN, 3, 9), 3);
}
