use crate::error::GeometryError;
use crate::fsm::{Direction, MachineProfile, Thresholds};
use crate::geometry::{self, between, near_ground, upper_body_is_lying_down, SignalSample};
use crate::landmark::{Joint, LandmarkFrame, Side};

use super::{scale_hold_frames, Exercise};

/// Glute bridge, tracked as a single whole-body machine.
///
/// The subject lies supine with knees bent and feet flat, then lifts the
/// pelvis. The driving signal is the hip angle (shoulder-hip-knee) averaged
/// over both sides: around 100-130 degrees at rest, opening past 155 at the
/// top of the bridge. Knees must stay bent and at least one foot grounded.
#[derive(Debug)]
pub struct Bridging;

const KNEE_BENT_MIN: f64 = 40.0;
const KNEE_BENT_MAX: f64 = 100.0;

impl Bridging {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Bridging {
    fn default() -> Self {
        Self::new()
    }
}

impl Exercise for Bridging {
    fn name(&self) -> &'static str {
        "bridging"
    }

    fn sides(&self) -> &'static [Side] {
        &[Side::Both]
    }

    fn required_joints(&self, _side: Side) -> Vec<Joint> {
        vec![
            Joint::LeftShoulder,
            Joint::RightShoulder,
            Joint::LeftHip,
            Joint::RightHip,
            Joint::LeftKnee,
            Joint::RightKnee,
            Joint::LeftAnkle,
            Joint::RightAnkle,
        ]
    }

    fn profile(&self, lenient: bool, fps: u32) -> MachineProfile {
        // Hip-angle bands from the original tuning: rest 100..130, raised
        // 155..180.
        let thresholds = if lenient {
            Thresholds {
                enter: 150.0,
                exit: 138.0,
                direction: Direction::Above,
                ideal_peak: 160.0,
            }
        } else {
            Thresholds {
                enter: 155.0,
                exit: 132.0,
                direction: Direction::Above,
                ideal_peak: 168.0,
            }
        };
        MachineProfile {
            thresholds,
            min_hold_frames: scale_hold_frames(if lenient { 4 } else { 8 }, fps),
            max_phase_duration_seconds: 25.0,
        }
    }

    fn compute(
        &self,
        frame: &LandmarkFrame,
        side: Side,
    ) -> Result<SignalSample, GeometryError> {
        let pts = geometry::require(frame, &self.required_joints(side))?;
        let (ls, rs, lh, rh, lk, rk) = (pts[0], pts[1], pts[2], pts[3], pts[4], pts[5]);

        let l_hip_angle = geometry::angle((ls.x, ls.y), (lh.x, lh.y), (lk.x, lk.y));
        let r_hip_angle = geometry::angle((rs.x, rs.y), (rh.x, rh.y), (rk.x, rk.y));
        let hip_angle = (l_hip_angle + r_hip_angle) / 2.0;

        let l_knee_angle =
            geometry::angle((lh.x, lh.y), (lk.x, lk.y), (pts[6].x, pts[6].y));
        let r_knee_angle =
            geometry::angle((rh.x, rh.y), (rk.x, rk.y), (pts[7].x, pts[7].y));

        let lying_down = upper_body_is_lying_down(frame)?;
        let foot_grounded = near_ground(frame, Joint::LeftAnkle)?
            || near_ground(frame, Joint::RightAnkle)?;
        let knees_bent = between(KNEE_BENT_MIN, l_knee_angle, KNEE_BENT_MAX)
            || between(KNEE_BENT_MIN, r_knee_angle, KNEE_BENT_MAX);

        Ok(SignalSample {
            value: hip_angle,
            in_position: lying_down && foot_grounded && knees_bent,
            timestamp: frame.timestamp,
            seq: frame.seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{FrameAdapter, RawDetection, RawLandmark};

    fn lm(joint: Joint, x: f64, y: f64) -> RawLandmark {
        RawLandmark {
            joint,
            x,
            y,
            z: None,
            visibility: 1.0,
        }
    }

    /// Supine bridge posture. `pelvis_lift` raises the hips off the floor.
    fn bridge_frame(pelvis_lift: f64) -> LandmarkFrame {
        let ground = 0.7;
        let hip_y = ground - pelvis_lift;
        let landmarks = vec![
            lm(Joint::LeftShoulder, 0.15, ground),
            lm(Joint::RightShoulder, 0.15, ground - 0.02),
            lm(Joint::LeftHip, 0.45, hip_y),
            lm(Joint::RightHip, 0.45, hip_y - 0.02),
            // Knees bent: knee above the ankle, foot flat.
            lm(Joint::LeftKnee, 0.58, ground - 0.22),
            lm(Joint::RightKnee, 0.58, ground - 0.24),
            lm(Joint::LeftAnkle, 0.63, ground),
            lm(Joint::RightAnkle, 0.63, ground - 0.01),
        ];
        FrameAdapter::default()
            .adapt(&RawDetection::new(1, 0.0, landmarks))
            .unwrap()
    }

    #[test]
    fn test_rest_hip_angle_is_below_enter_threshold() {
        let exercise = Bridging::new();
        let sample = exercise.compute(&bridge_frame(0.0), Side::Both).unwrap();
        let profile = exercise.profile(false, 30);
        assert!(sample.value < profile.thresholds.enter);
        assert!(sample.in_position, "rest posture should gate in");
    }

    #[test]
    fn test_lifting_pelvis_opens_the_hip_angle() {
        let exercise = Bridging::new();
        let rest = exercise.compute(&bridge_frame(0.0), Side::Both).unwrap();
        let top = exercise.compute(&bridge_frame(0.12), Side::Both).unwrap();
        assert!(top.value > rest.value + 10.0);
    }

    #[test]
    fn test_single_machine_exercise() {
        assert_eq!(Bridging::new().sides(), &[Side::Both]);
    }

    #[test]
    fn test_missing_knee_propagates() {
        let exercise = Bridging::new();
        let ground = 0.7;
        let landmarks = vec![
            lm(Joint::LeftShoulder, 0.15, ground),
            lm(Joint::RightShoulder, 0.15, ground),
            lm(Joint::LeftHip, 0.45, ground),
            lm(Joint::RightHip, 0.45, ground),
            lm(Joint::LeftKnee, 0.58, ground - 0.2),
            lm(Joint::LeftAnkle, 0.63, ground),
            lm(Joint::RightAnkle, 0.63, ground),
        ];
        let frame = FrameAdapter::default()
            .adapt(&RawDetection::new(1, 0.0, landmarks))
            .unwrap();
        let err = exercise.compute(&frame, Side::Both).unwrap_err();
        assert!(matches!(
            err,
            GeometryError::InsufficientLandmarks { ref joints } if joints == &vec![Joint::RightKnee]
        ));
    }
}
