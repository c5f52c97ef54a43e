//! Posture classification from landmark geometry.
//!
//! Two angles are derived from the landmarks:
//!
//! - **Head tilt**: forward lean of the ear midpoint relative to the shoulder
//!   midpoint, measured as an angle from vertical. Using an angle instead of a
//!   raw offset keeps the measure roughly independent of camera distance.
//! - **Shoulder tilt**: deviation of the shoulder line from horizontal.
//!
//! Missing points never cause an error; the affected angle is reported as 0.

use crate::capture::types::{LandmarkFrame, LandmarkSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Head tilt (degrees) above which posture is a warning.
pub const HEAD_TILT_WARNING_DEG: f64 = 12.0;

/// Head tilt (degrees) above which posture is dangerous.
pub const HEAD_TILT_DANGER_DEG: f64 = 20.0;

/// Shoulder tilt (degrees) above which posture is a warning.
pub const SHOULDER_TILT_WARNING_DEG: f64 = 6.0;

/// Shoulder tilt (degrees) above which posture is dangerous.
pub const SHOULDER_TILT_DANGER_DEG: f64 = 12.0;

/// Below this ear-to-shoulder distance the head tilt is unreliable.
const MIN_VERTICAL_DISTANCE: f64 = 0.01;

/// Classified posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureStatus {
    Good,
    Warning,
    Danger,
}

impl PostureStatus {
    /// Whether this status counts as bad posture.
    pub fn is_bad(self) -> bool {
        !matches!(self, PostureStatus::Good)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PostureStatus::Good => "good",
            PostureStatus::Warning => "warning",
            PostureStatus::Danger => "danger",
        }
    }
}

impl fmt::Display for PostureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Angle thresholds for classification. Comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    pub head_tilt_warning: f64,
    pub head_tilt_danger: f64,
    pub shoulder_tilt_warning: f64,
    pub shoulder_tilt_danger: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            head_tilt_warning: HEAD_TILT_WARNING_DEG,
            head_tilt_danger: HEAD_TILT_DANGER_DEG,
            shoulder_tilt_warning: SHOULDER_TILT_WARNING_DEG,
            shoulder_tilt_danger: SHOULDER_TILT_DANGER_DEG,
        }
    }
}

/// One classified landmark frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureSample {
    pub status: PostureStatus,
    /// Forward head lean in degrees from vertical
    pub head_tilt_angle: f64,
    /// Shoulder line deviation from horizontal in degrees
    pub shoulder_tilt_angle: f64,
    /// Mean visibility of the required points (0-1)
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Classify a landmark frame.
pub fn analyze(frame: &LandmarkFrame, thresholds: &ClassifierThresholds) -> PostureSample {
    let head_tilt_angle = head_tilt_angle(&frame.landmarks);
    let shoulder_tilt_angle = shoulder_tilt_angle(&frame.landmarks);

    PostureSample {
        status: classify(head_tilt_angle, shoulder_tilt_angle, thresholds),
        head_tilt_angle,
        shoulder_tilt_angle,
        confidence: landmark_confidence(&frame.landmarks),
        timestamp: frame.timestamp,
    }
}

/// Forward head lean in degrees. Requires all five points.
pub fn head_tilt_angle(landmarks: &LandmarkSet) -> f64 {
    let (Some(_nose), Some(left_ear), Some(right_ear), Some(left_shoulder), Some(right_shoulder)) = (
        landmarks.nose,
        landmarks.left_ear,
        landmarks.right_ear,
        landmarks.left_shoulder,
        landmarks.right_shoulder,
    ) else {
        return 0.0;
    };

    let head_x = (left_ear.x + right_ear.x) / 2.0;
    let head_y = (left_ear.y + right_ear.y) / 2.0;
    let shoulder_x = (left_shoulder.x + right_shoulder.x) / 2.0;
    let shoulder_y = (left_shoulder.y + right_shoulder.y) / 2.0;

    let horizontal_offset = (head_x - shoulder_x).abs();
    let vertical_distance = (shoulder_y - head_y).abs();

    // Camera too close or landmarks collapsed onto each other.
    if vertical_distance < MIN_VERTICAL_DISTANCE {
        return 0.0;
    }

    (horizontal_offset / vertical_distance).atan().to_degrees()
}

/// Shoulder line deviation from horizontal in degrees. Requires both shoulders.
///
/// The result is in [0, 90] regardless of which side of the image each
/// shoulder appears on, so mirrored and unmirrored cameras agree.
pub fn shoulder_tilt_angle(landmarks: &LandmarkSet) -> f64 {
    let (Some(left), Some(right)) = (landmarks.left_shoulder, landmarks.right_shoulder) else {
        return 0.0;
    };

    let angle = (right.y - left.y).atan2(right.x - left.x).to_degrees().abs();
    // Unmirrored BlazePose input has the left shoulder on the image's right,
    // which reads as about 180 degrees for a level shoulder line.
    if angle > 90.0 {
        180.0 - angle
    } else {
        angle
    }
}

/// Mean visibility over the required points that are present.
///
/// A present point without a visibility score contributes 0. Returns 0 when
/// none of the points are present.
pub fn landmark_confidence(landmarks: &LandmarkSet) -> f64 {
    let present: Vec<f64> = landmarks
        .required_points()
        .iter()
        .flatten()
        .map(|point| point.visibility.unwrap_or(0.0))
        .collect();

    if present.is_empty() {
        return 0.0;
    }
    present.iter().sum::<f64>() / present.len() as f64
}

/// Two-tier classification; danger takes precedence over warning.
pub fn classify(
    head_tilt_angle: f64,
    shoulder_tilt_angle: f64,
    thresholds: &ClassifierThresholds,
) -> PostureStatus {
    if head_tilt_angle > thresholds.head_tilt_danger
        || shoulder_tilt_angle > thresholds.shoulder_tilt_danger
    {
        PostureStatus::Danger
    } else if head_tilt_angle > thresholds.head_tilt_warning
        || shoulder_tilt_angle > thresholds.shoulder_tilt_warning
    {
        PostureStatus::Warning
    } else {
        PostureStatus::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::Landmark;

    fn point(x: f64, y: f64) -> Option<Landmark> {
        Some(Landmark::new(x, y, 1.0))
    }

    /// Ears centered at (head_x, 0.3), shoulders level at y=0.6 around x=0.5.
    fn set_with_head_at(head_x: f64) -> LandmarkSet {
        LandmarkSet {
            nose: point(head_x, 0.28),
            left_ear: point(head_x + 0.05, 0.3),
            right_ear: point(head_x - 0.05, 0.3),
            left_shoulder: point(0.65, 0.6),
            right_shoulder: point(0.35, 0.6),
        }
    }

    #[test]
    fn test_upright_posture_is_good() {
        let set = set_with_head_at(0.5);
        assert!(head_tilt_angle(&set).abs() < 1e-9);
        assert!(shoulder_tilt_angle(&set).abs() < 1e-9);
        let frame = LandmarkFrame::new(set);
        assert_eq!(
            analyze(&frame, &ClassifierThresholds::default()).status,
            PostureStatus::Good
        );
    }

    #[test]
    fn test_head_tilt_is_angle_from_vertical() {
        // Offset 0.3 over a vertical distance of 0.3 is 45 degrees.
        let set = set_with_head_at(0.8);
        assert!((head_tilt_angle(&set) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_head_tilt_degenerate_vertical_distance() {
        let mut set = set_with_head_at(0.9);
        set.left_ear = point(0.95, 0.595);
        set.right_ear = point(0.85, 0.595);
        assert_eq!(head_tilt_angle(&set), 0.0);
    }

    #[test]
    fn test_missing_points_default_to_zero() {
        let mut set = set_with_head_at(0.8);
        set.nose = None;
        assert_eq!(head_tilt_angle(&set), 0.0);

        let mut set = LandmarkSet {
            left_shoulder: point(0.3, 0.5),
            right_shoulder: point(0.7, 0.7),
            ..LandmarkSet::default()
        };
        assert_eq!(head_tilt_angle(&set), 0.0);
        assert!(shoulder_tilt_angle(&set) > 0.0);

        set.right_shoulder = None;
        assert_eq!(shoulder_tilt_angle(&set), 0.0);
        assert_eq!(head_tilt_angle(&set), 0.0);
    }

    #[test]
    fn test_shoulder_tilt() {
        // Right shoulder listed to the right of the left one, 0.1 lower over 0.1.
        let set = LandmarkSet {
            left_shoulder: point(0.4, 0.5),
            right_shoulder: point(0.5, 0.6),
            ..LandmarkSet::default()
        };
        assert!((shoulder_tilt_angle(&set) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_shoulder_tilt_independent_of_mirroring() {
        let unmirrored = LandmarkSet {
            left_shoulder: point(0.65, 0.6),
            right_shoulder: point(0.35, 0.65),
            ..LandmarkSet::default()
        };
        let mirrored = LandmarkSet {
            left_shoulder: point(0.35, 0.65),
            right_shoulder: point(0.65, 0.6),
            ..LandmarkSet::default()
        };
        let a = shoulder_tilt_angle(&unmirrored);
        let b = shoulder_tilt_angle(&mirrored);
        assert!((a - b).abs() < 1e-9);
        assert!(a > 9.0 && a < 10.0);
    }

    #[test]
    fn test_confidence_over_present_points() {
        let set = LandmarkSet {
            nose: Some(Landmark::new(0.5, 0.3, 0.9)),
            left_ear: Some(Landmark::new(0.5, 0.3, 0.5)),
            right_ear: Some(Landmark {
                x: 0.5,
                y: 0.3,
                z: 0.0,
                visibility: None,
            }),
            left_shoulder: None,
            right_shoulder: None,
        };
        // (0.9 + 0.5 + 0.0) / 3
        assert!((landmark_confidence(&set) - 1.4 / 3.0).abs() < 1e-9);
        assert_eq!(landmark_confidence(&LandmarkSet::default()), 0.0);
    }

    #[test]
    fn test_classification_boundaries() {
        let t = ClassifierThresholds::default();
        assert_eq!(classify(0.0, 0.0, &t), PostureStatus::Good);
        assert_eq!(classify(12.0, 0.0, &t), PostureStatus::Good);
        assert_eq!(classify(12.01, 0.0, &t), PostureStatus::Warning);
        assert_eq!(classify(20.0, 0.0, &t), PostureStatus::Warning);
        assert_eq!(classify(20.01, 0.0, &t), PostureStatus::Danger);
        assert_eq!(classify(0.0, 6.0, &t), PostureStatus::Good);
        assert_eq!(classify(0.0, 6.5, &t), PostureStatus::Warning);
        assert_eq!(classify(0.0, 12.5, &t), PostureStatus::Danger);
        // Danger on either axis wins over warning on the other.
        assert_eq!(classify(13.0, 12.5, &t), PostureStatus::Danger);
    }

    #[test]
    fn test_analyze_carries_frame_timestamp() {
        let frame = LandmarkFrame::new(set_with_head_at(0.8));
        let sample = analyze(&frame, &ClassifierThresholds::default());
        assert_eq!(sample.timestamp, frame.timestamp);
        assert_eq!(sample.status, PostureStatus::Danger);
        assert!((sample.confidence - 1.0).abs() < 1e-9);
    }
}
