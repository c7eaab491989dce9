use crate::error::GeometryError;
use crate::fsm::{Direction, MachineProfile, Thresholds};
use crate::geometry::{
    self, between, feet_pointing_down, joint_angle, midpoint, upper_body_is_lying_down,
    SignalSample,
};
use crate::landmark::{Joint, LandmarkFrame, Side};

use super::{scale_hold_frames, Exercise};

/// Prone straight leg raise, tracked per leg.
///
/// The subject lies face down and lifts one straight leg off the floor. The
/// driving signal is the raise angle at the hip between the shoulder midpoint
/// and the ankle: near 180 degrees with the leg resting, falling through the
/// 130s at the top of the lift. The working knee must stay straight; strict
/// mode also requires the support leg to stay straight and grounded.
#[derive(Debug)]
pub struct ProneStraightLegRaise;

const KNEE_STRAIGHT_MIN: f64 = 150.0;
const KNEE_STRAIGHT_MAX: f64 = 180.0;

impl ProneStraightLegRaise {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProneStraightLegRaise {
    fn default() -> Self {
        Self::new()
    }
}

impl Exercise for ProneStraightLegRaise {
    fn name(&self) -> &'static str {
        "prone_straight_leg_raise"
    }

    fn sides(&self) -> &'static [Side] {
        &[Side::Left, Side::Right]
    }

    fn required_joints(&self, side: Side) -> Vec<Joint> {
        vec![
            Joint::LeftShoulder,
            Joint::RightShoulder,
            Joint::LeftHip,
            Joint::RightHip,
            side.resolve(Joint::LeftKnee),
            side.resolve(Joint::LeftAnkle),
        ]
    }

    fn profile(&self, lenient: bool, fps: u32) -> MachineProfile {
        // Raise bands from the original tuning: rest 160..180, raised
        // 100..140. The hip extends less far back than it flexes forward, so
        // the active band sits higher than the supine raise's.
        let thresholds = if lenient {
            Thresholds {
                enter: 138.0,
                exit: 166.0,
                direction: Direction::Below,
                ideal_peak: 120.0,
            }
        } else {
            Thresholds {
                enter: 132.0,
                exit: 163.0,
                direction: Direction::Below,
                ideal_peak: 110.0,
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
        let required = self.required_joints(side);
        let pts = geometry::require(frame, &required)?;
        let (lshoulder, rshoulder, knee, ankle) = (pts[0], pts[1], pts[4], pts[5]);
        let hip = if side == Side::Right { pts[3] } else { pts[2] };

        let shoulder_mid = midpoint((lshoulder.x, lshoulder.y), (rshoulder.x, rshoulder.y));
        let raise_angle = geometry::angle(shoulder_mid, (hip.x, hip.y), (ankle.x, ankle.y));

        let knee_angle = geometry::angle((hip.x, hip.y), (knee.x, knee.y), (ankle.x, ankle.y));
        let lying_down = upper_body_is_lying_down(frame)?;
        // Toe direction separates prone from supine; without the heel joints
        // the frame cannot gate in.
        let prone = feet_pointing_down(frame).unwrap_or(false);
        let knee_straight = between(KNEE_STRAIGHT_MIN, knee_angle, KNEE_STRAIGHT_MAX);

        // Support-leg checks are best-effort: when those joints are occluded
        // the working side can still be tracked.
        let support_ok = self.support_leg_ok(frame, side).unwrap_or(true);

        Ok(SignalSample {
            value: raise_angle,
            in_position: lying_down && prone && knee_straight && support_ok,
            timestamp: frame.timestamp,
            seq: frame.seq,
        })
    }
}

impl ProneStraightLegRaise {
    /// The non-working leg should remain straight and on the floor.
    fn support_leg_ok(&self, frame: &LandmarkFrame, side: Side) -> Result<bool, GeometryError> {
        let other = match side {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Both => return Ok(true),
        };
        let hip = other.resolve(Joint::LeftHip);
        let knee = other.resolve(Joint::LeftKnee);
        let ankle = other.resolve(Joint::LeftAnkle);
        let knee_angle = joint_angle(frame, hip, knee, ankle)?;
        let grounded = geometry::near_ground(frame, ankle)?;
        Ok(grounded && between(KNEE_STRAIGHT_MIN, knee_angle, KNEE_STRAIGHT_MAX))
    }
}
