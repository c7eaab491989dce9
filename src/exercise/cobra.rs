use crate::error::GeometryError;
use crate::fsm::{Direction, MachineProfile, Thresholds};
use crate::geometry::{self, feet_pointing_down, midpoint, near_ground, SignalSample};
use crate::landmark::{Joint, LandmarkFrame, Side};

use super::{scale_hold_frames, Exercise};

/// Prone back extension (cobra), tracked as a single whole-body machine.
///
/// The subject lies face down and pushes the chest up while the pelvis stays
/// on the floor. The driving signal is the trunk angle at the hip midpoint
/// between the shoulder midpoint and the better-visible knee: near 180
/// degrees flat on the floor, closing below 150 at full extension. Hips must
/// stay grounded and the feet must point into the floor.
#[derive(Debug)]
pub struct CobraStretch;

impl CobraStretch {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CobraStretch {
    fn default() -> Self {
        Self::new()
    }
}

impl Exercise for CobraStretch {
    fn name(&self) -> &'static str {
        "cobra_stretch"
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
        // Trunk-angle bands from the original tuning: flat above 165,
        // extended below 150. The signal falls as the chest lifts.
        let thresholds = if lenient {
            Thresholds {
                enter: 155.0,
                exit: 168.0,
                direction: Direction::Below,
                ideal_peak: 142.0,
            }
        } else {
            Thresholds {
                enter: 150.0,
                exit: 165.0,
                direction: Direction::Below,
                ideal_peak: 135.0,
            }
        };
        MachineProfile {
            thresholds,
            min_hold_frames: scale_hold_frames(if lenient { 4 } else { 8 }, fps),
            max_phase_duration_seconds: 30.0,
        }
    }

    fn compute(
        &self,
        frame: &LandmarkFrame,
        _side: Side,
    ) -> Result<SignalSample, GeometryError> {
        let pts = geometry::require(
            frame,
            &[
                Joint::LeftShoulder,
                Joint::RightShoulder,
                Joint::LeftHip,
                Joint::RightHip,
            ],
        )?;
        let (ls, rs, lh, rh) = (pts[0], pts[1], pts[2], pts[3]);

        // The better-visible knee stands in for the leg line; one side is
        // usually turned away from the camera.
        let knee = match (frame.get(Joint::LeftKnee), frame.get(Joint::RightKnee)) {
            (Some(l), Some(r)) => {
                if l.visibility >= r.visibility {
                    l
                } else {
                    r
                }
            }
            (Some(k), None) | (None, Some(k)) => k,
            (None, None) => {
                return Err(GeometryError::InsufficientLandmarks {
                    joints: vec![Joint::LeftKnee, Joint::RightKnee],
                })
            }
        };

        let shoulder_mid = midpoint((ls.x, ls.y), (rs.x, rs.y));
        let hip_mid = midpoint((lh.x, lh.y), (rh.x, rh.y));
        let trunk_angle = geometry::angle(shoulder_mid, hip_mid, (knee.x, knee.y));

        let hips_grounded =
            near_ground(frame, Joint::LeftHip)? || near_ground(frame, Joint::RightHip)?;
        // Toe direction separates prone from supine; without the heel joints
        // the frame cannot gate in.
        let prone = feet_pointing_down(frame).unwrap_or(false);

        Ok(SignalSample {
            value: trunk_angle,
            in_position: hips_grounded && prone,
            timestamp: frame.timestamp,
            seq: frame.seq,
        })
    }
}
