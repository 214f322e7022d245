//! Keypoint and pose types produced by the `PoseNet` model.

use crate::constants::NUM_KEYPOINTS;

/// The 17 body parts estimated by `PoseNet`, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointPart {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointPart {
    /// All parts in model output order
    pub const ALL: [KeypointPart; NUM_KEYPOINTS] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// Look up a part by its output channel
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// `PoseNet` label for this part
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEar => "leftEar",
            Self::RightEar => "rightEar",
            Self::LeftShoulder => "leftShoulder",
            Self::RightShoulder => "rightShoulder",
            Self::LeftElbow => "leftElbow",
            Self::RightElbow => "rightElbow",
            Self::LeftWrist => "leftWrist",
            Self::RightWrist => "rightWrist",
            Self::LeftHip => "leftHip",
            Self::RightHip => "rightHip",
            Self::LeftKnee => "leftKnee",
            Self::RightKnee => "rightKnee",
            Self::LeftAnkle => "leftAnkle",
            Self::RightAnkle => "rightAnkle",
        }
    }
}

/// Pixel position of a keypoint
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A single landmark estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Position in pixels of the frame the pose was estimated on
    pub position: Position,
    /// Confidence score (0.0-1.0)
    pub score: f32,
    /// Which body part this is
    pub part: KeypointPart,
}

impl Keypoint {
    #[must_use]
    pub fn new(part: KeypointPart, x: f32, y: f32, score: f32) -> Self {
        Self {
            position: Position::new(x, y),
            score,
            part,
        }
    }

    /// `PoseNet` label of the part
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.part.label()
    }

    /// Whether the score is strictly above `threshold`
    #[must_use]
    pub fn exceeds(&self, threshold: f32) -> bool {
        self.score > threshold
    }
}

/// All keypoints of the single detected subject in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: [Keypoint; NUM_KEYPOINTS],
    /// Mean keypoint score
    pub score: f32,
}

impl Pose {
    /// Build a pose; the overall score is the mean keypoint score
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(keypoints: [Keypoint; NUM_KEYPOINTS]) -> Self {
        let score = keypoints.iter().map(|k| k.score).sum::<f32>() / NUM_KEYPOINTS as f32;
        Self { keypoints, score }
    }

    /// Keypoint for a given part
    #[must_use]
    pub fn get(&self, part: KeypointPart) -> &Keypoint {
        &self.keypoints[part as usize]
    }

    /// Map positions from a `from` pixel space into a `to` pixel space
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rescaled(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        if from == to || from.0 == 0 || from.1 == 0 {
            return self.clone();
        }
        let sx = to.0 as f32 / from.0 as f32;
        let sy = to.1 as f32 / from.1 as f32;
        let mut keypoints = self.keypoints;
        for kp in &mut keypoints {
            kp.position.x *= sx;
            kp.position.y *= sy;
        }
        Self {
            keypoints,
            score: self.score,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(KeypointPart::ALL.map(|part| Keypoint::new(part, 0.0, 0.0, 0.0)))
    }
}
