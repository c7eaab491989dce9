use crate::error::GeometryError;
use crate::fsm::{Direction, MachineProfile, Thresholds};
use crate::geometry::{self, between, SignalSample};
use crate::landmark::{Joint, LandmarkFrame, Side};

use super::{scale_hold_frames, Exercise};

/// Ankle pumps (dorsi/plantar flexion), tracked per foot.
///
/// The subject sits or lies with legs extended and points the toes away,
/// then relaxes. The driving signal is the ankle angle (knee-ankle-toe):
/// 80-110 degrees relaxed, opening past 140 at full plantar flexion. The leg
/// must stay reasonably extended so knee movement cannot fake a pump.
#[derive(Debug)]
pub struct AnklePumps;

const LEG_EXTENDED_MIN: f64 = 120.0;
const LEG_EXTENDED_MAX: f64 = 180.0;

impl AnklePumps {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnklePumps {
    fn default() -> Self {
        Self::new()
    }
}

impl Exercise for AnklePumps {
    fn name(&self) -> &'static str {
        "ankle_pumps"
    }

    fn sides(&self) -> &'static [Side] {
        &[Side::Left, Side::Right]
    }

    fn required_joints(&self, side: Side) -> Vec<Joint> {
        vec![
            side.resolve(Joint::LeftHip),
            side.resolve(Joint::LeftKnee),
            side.resolve(Joint::LeftAnkle),
            side.resolve(Joint::LeftFootIndex),
        ]
    }

    fn profile(&self, lenient: bool, fps: u32) -> MachineProfile {
        // Stretch bands from the original tuning: relaxed 80..110,
        // stretched 140..180.
        let thresholds = if lenient {
            Thresholds {
                enter: 135.0,
                exit: 118.0,
                direction: Direction::Above,
                ideal_peak: 145.0,
            }
        } else {
            Thresholds {
                enter: 140.0,
                exit: 112.0,
                direction: Direction::Above,
                ideal_peak: 155.0,
            }
        };
        MachineProfile {
            thresholds,
            min_hold_frames: scale_hold_frames(if lenient { 3 } else { 5 }, fps),
            max_phase_duration_seconds: 10.0,
        }
    }

    fn compute(
        &self,
        frame: &LandmarkFrame,
        side: Side,
    ) -> Result<SignalSample, GeometryError> {
        let pts = geometry::require(frame, &self.required_joints(side))?;
        let (hip, knee, ankle, toe) = (pts[0], pts[1], pts[2], pts[3]);

        let ankle_angle =
            geometry::angle((knee.x, knee.y), (ankle.x, ankle.y), (toe.x, toe.y));
        let knee_angle =
            geometry::angle((hip.x, hip.y), (knee.x, knee.y), (ankle.x, ankle.y));

        Ok(SignalSample {
            value: ankle_angle,
            in_position: between(LEG_EXTENDED_MIN, knee_angle, LEG_EXTENDED_MAX),
            timestamp: frame.timestamp,
            seq: frame.seq,
        })
    }
}
