//! Landmark types delivered by the detection collaborator.
//!
//! Only the five points the posture analyzer needs are kept: nose, both ears
//! and both shoulders. Everything else the detector produces is discarded at
//! the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BlazePose index of the nose.
pub const NOSE: usize = 0;
/// BlazePose index of the left ear.
pub const LEFT_EAR: usize = 7;
/// BlazePose index of the right ear.
pub const RIGHT_EAR: usize = 8;
/// BlazePose index of the left shoulder.
pub const LEFT_SHOULDER: usize = 11;
/// BlazePose index of the right shoulder.
pub const RIGHT_SHOULDER: usize = 12;

/// A single normalized landmark.
///
/// `x` and `y` are normalized to the frame (0..1, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    /// Depth relative to the hips; unused by the analyzer
    #[serde(default)]
    pub z: f64,
    /// Visibility score in [0, 1], if the detector reported one
    #[serde(default)]
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: Some(visibility),
        }
    }
}

/// The landmark points required for posture analysis.
///
/// A point is `None` when the detector did not locate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    #[serde(default)]
    pub nose: Option<Landmark>,
    #[serde(default)]
    pub left_ear: Option<Landmark>,
    #[serde(default)]
    pub right_ear: Option<Landmark>,
    #[serde(default)]
    pub left_shoulder: Option<Landmark>,
    #[serde(default)]
    pub right_shoulder: Option<Landmark>,
}

impl LandmarkSet {
    /// Pick the required points out of a BlazePose-indexed landmark list.
    pub fn from_pose_landmarks(points: &[Option<Landmark>]) -> Self {
        let at = |index: usize| points.get(index).copied().flatten();
        Self {
            nose: at(NOSE),
            left_ear: at(LEFT_EAR),
            right_ear: at(RIGHT_EAR),
            left_shoulder: at(LEFT_SHOULDER),
            right_shoulder: at(RIGHT_SHOULDER),
        }
    }

    /// The five required points in a fixed order.
    pub fn required_points(&self) -> [Option<&Landmark>; 5] {
        [
            self.nose.as_ref(),
            self.left_ear.as_ref(),
            self.right_ear.as_ref(),
            self.left_shoulder.as_ref(),
            self.right_shoulder.as_ref(),
        ]
    }

    /// Whether all five required points are present.
    pub fn is_complete(&self) -> bool {
        self.required_points().iter().all(Option::is_some)
    }
}

/// A landmark set together with the time its frame was processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub timestamp: DateTime<Utc>,
    pub landmarks: LandmarkSet,
}

impl LandmarkFrame {
    /// Stamp a landmark set with the current time.
    pub fn new(landmarks: LandmarkSet) -> Self {
        Self::at(Utc::now(), landmarks)
    }

    pub fn at(timestamp: DateTime<Utc>, landmarks: LandmarkSet) -> Self {
        Self {
            timestamp,
            landmarks,
        }
    }
}

/// What a detector reports for one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// A subject was found
    Landmarks(LandmarkFrame),
    /// The frame was processed but nobody was in view
    NoSubject,
    /// The detector failed
    Error(String),
}
