use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// Named anatomical points, matching the MediaPipe Pose landmark set that the
/// upstream detector emits. Only the joints used by the shipped exercises are
/// listed; unknown indices from the detector are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl Joint {
    /// Mirror a joint to the other side of the body. Central joints map to
    /// themselves.
    pub fn mirrored(&self) -> Joint {
        match self {
            Joint::Nose => Joint::Nose,
            Joint::LeftShoulder => Joint::RightShoulder,
            Joint::RightShoulder => Joint::LeftShoulder,
            Joint::LeftElbow => Joint::RightElbow,
            Joint::RightElbow => Joint::LeftElbow,
            Joint::LeftWrist => Joint::RightWrist,
            Joint::RightWrist => Joint::LeftWrist,
            Joint::LeftHip => Joint::RightHip,
            Joint::RightHip => Joint::LeftHip,
            Joint::LeftKnee => Joint::RightKnee,
            Joint::RightKnee => Joint::LeftKnee,
            Joint::LeftAnkle => Joint::RightAnkle,
            Joint::RightAnkle => Joint::LeftAnkle,
            Joint::LeftHeel => Joint::RightHeel,
            Joint::RightHeel => Joint::LeftHeel,
            Joint::LeftFootIndex => Joint::RightFootIndex,
            Joint::RightFootIndex => Joint::LeftFootIndex,
        }
    }
}

/// Body side for bilateral exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
    /// Single-machine exercises that use both halves of the body at once.
    Both,
}

impl Side {
    /// Resolve a left-side joint to this side's equivalent.
    pub fn resolve(&self, left_joint: Joint) -> Joint {
        match self {
            Side::Left | Side::Both => left_joint,
            Side::Right => left_joint.mirrored(),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
            Side::Both => write!(f, "both"),
        }
    }
}

/// A single landmark position in normalized image coordinates. `x` and `y`
/// are in [0, 1] with y growing downward, matching the detector. `z` is the
/// detector's relative depth estimate when available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: Option<f64>,
    pub visibility: f64,
}

/// One landmark as reported by the external pose estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLandmark {
    pub joint: Joint,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: Option<f64>,
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

fn default_visibility() -> f64 {
    1.0
}

/// Raw detector output for one video frame. An empty landmark list means the
/// detector found no subject in the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    /// Frame sequence number; gaps are allowed (dropped frames).
    pub seq: u64,
    /// Media timestamp in seconds.
    pub timestamp: f64,
    #[serde(default)]
    pub landmarks: Vec<RawLandmark>,
}

impl RawDetection {
    pub fn new(seq: u64, timestamp: f64, landmarks: Vec<RawLandmark>) -> Self {
        Self {
            seq,
            timestamp,
            landmarks,
        }
    }

    /// A frame in which the detector reported no subject.
    pub fn empty(seq: u64, timestamp: f64) -> Self {
        Self::new(seq, timestamp, Vec::new())
    }
}

/// Normalized landmark frame. Immutable once produced; joints whose
/// visibility fell below the adapter threshold are absent from the map rather
/// than carrying a stale or zeroed position.
#[derive(Debug, Clone)]
pub struct LandmarkFrame {
    pub seq: u64,
    pub timestamp: f64,
    points: HashMap<Joint, LandmarkPoint>,
}

impl LandmarkFrame {
    pub fn get(&self, joint: Joint) -> Option<&LandmarkPoint> {
        self.points.get(&joint)
    }

    pub fn contains(&self, joint: Joint) -> bool {
        self.points.contains_key(&joint)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Joints from `required` that are missing from this frame.
    pub fn missing_from(&self, required: &[Joint]) -> Vec<Joint> {
        required
            .iter()
            .copied()
            .filter(|j| !self.contains(*j))
            .collect()
    }
}

/// Normalizes raw detector output into a [`LandmarkFrame`]. Pure transform,
/// no state.
#[derive(Debug, Clone)]
pub struct FrameAdapter {
    visibility_threshold: f64,
}

impl FrameAdapter {
    pub fn new(visibility_threshold: f64) -> Self {
        Self {
            visibility_threshold,
        }
    }

    /// Convert one raw detection into a landmark frame. Returns `None` when
    /// the detector reported no subject (a missing-frame tick).
    pub fn adapt(&self, raw: &RawDetection) -> Option<LandmarkFrame> {
        if raw.landmarks.is_empty() {
            trace!("frame {}: no subject detected", raw.seq);
            return None;
        }

        let mut points = HashMap::with_capacity(raw.landmarks.len());
        for lm in &raw.landmarks {
            if lm.visibility < self.visibility_threshold {
                trace!(
                    "frame {}: dropping {:?} (visibility {:.2} < {:.2})",
                    raw.seq,
                    lm.joint,
                    lm.visibility,
                    self.visibility_threshold
                );
                continue;
            }
            points.insert(
                lm.joint,
                LandmarkPoint {
                    x: lm.x,
                    y: lm.y,
                    z: lm.z,
                    visibility: lm.visibility,
                },
            );
        }

        Some(LandmarkFrame {
            seq: raw.seq,
            timestamp: raw.timestamp,
            points,
        })
    }
}

impl Default for FrameAdapter {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(joint: Joint, visibility: f64) -> RawLandmark {
        RawLandmark {
            joint,
            x: 0.5,
            y: 0.5,
            z: None,
            visibility,
        }
    }

    #[test]
    fn test_empty_detection_is_missing_frame() {
        let adapter = FrameAdapter::default();
        assert!(adapter.adapt(&RawDetection::empty(1, 0.0)).is_none());
    }

    #[test]
    fn test_low_visibility_joint_is_dropped_not_zeroed() {
        let adapter = FrameAdapter::new(0.5);
        let detection = RawDetection::new(
            7,
            0.25,
            vec![raw(Joint::LeftKnee, 0.9), raw(Joint::LeftAnkle, 0.2)],
        );

        let frame = adapter.adapt(&detection).unwrap();
        assert!(frame.contains(Joint::LeftKnee));
        assert!(!frame.contains(Joint::LeftAnkle));
        assert_eq!(frame.seq, 7);
        assert_eq!(
            frame.missing_from(&[Joint::LeftKnee, Joint::LeftAnkle]),
            vec![Joint::LeftAnkle]
        );
    }

    #[test]
    fn test_side_resolution() {
        assert_eq!(Side::Left.resolve(Joint::LeftKnee), Joint::LeftKnee);
        assert_eq!(Side::Right.resolve(Joint::LeftKnee), Joint::RightKnee);
        assert_eq!(Side::Right.resolve(Joint::Nose), Joint::Nose);
        assert_eq!(Side::Both.resolve(Joint::LeftHip), Joint::LeftHip);
    }

    #[test]
    fn test_default_visibility_deserializes() {
        let json = r#"{"seq":1,"timestamp":0.033,"landmarks":[{"joint":"left_knee","x":0.4,"y":0.6}]}"#;
        let detection: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(detection.landmarks[0].visibility, 1.0);
        assert_eq!(detection.landmarks[0].joint, Joint::LeftKnee);
    }
}
