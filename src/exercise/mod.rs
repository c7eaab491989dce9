pub mod ankle_pumps;
pub mod bridging;
pub mod cobra;
pub mod leg_raise;
pub mod prone_leg_raise;

use crate::error::{GeometryError, SessionError};
use crate::fsm::MachineProfile;
use crate::geometry::SignalSample;
use crate::landmark::{Joint, LandmarkFrame, Side};

pub use ankle_pumps::AnklePumps;
pub use bridging::Bridging;
pub use cobra::CobraStretch;
pub use leg_raise::StraightLegRaise;
pub use prone_leg_raise::ProneStraightLegRaise;

/// An exercise definition: the joints it watches, how it derives its driving
/// signal, and its transition thresholds. One implementation per exercise;
/// the shared state machine and session infrastructure are polymorphic over
/// this trait.
pub trait Exercise: Send + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// The independent machines this exercise runs. Bilateral exercises
    /// report `[Left, Right]`; whole-body exercises report `[Both]`.
    fn sides(&self) -> &'static [Side];

    /// Joints that must be visible for this side's signal to exist.
    fn required_joints(&self, side: Side) -> Vec<Joint>;

    /// Resolved transition policy for the session's mode and frame rate.
    fn profile(&self, lenient: bool, fps: u32) -> MachineProfile;

    /// Derive the driving signal and posture gate for one side of one frame.
    /// Fails with [`GeometryError::InsufficientLandmarks`] when required
    /// joints are unavailable; never substitutes a default angle.
    fn compute(&self, frame: &LandmarkFrame, side: Side)
        -> Result<SignalSample, GeometryError>;
}

/// Scale a hold-frame requirement expressed at 30 fps to the session's frame
/// rate, keeping at least two frames of debounce.
pub(crate) fn scale_hold_frames(base_at_30fps: u32, fps: u32) -> u32 {
    ((base_at_30fps * fps + 15) / 30).max(2)
}

/// Factory keyed on exercise name, mirroring how sessions select an exercise
/// at construction time. Accepts a few historical aliases.
pub fn create_exercise(name: &str) -> Result<Box<dyn Exercise>, SessionError> {
    match name {
        "straight_leg_raise" | "slr" | "any_slr" => Ok(Box::new(StraightLegRaise::new())),
        "prone_straight_leg_raise" | "prone_slr" | "any_prone_slr"
        | "any_prone_straight_leg_raise" => Ok(Box::new(ProneStraightLegRaise::new())),
        "bridging" => Ok(Box::new(Bridging::new())),
        "ankle_pumps" | "ankle_toe_movement" => Ok(Box::new(AnklePumps::new())),
        "cobra_stretch" | "cobra" => Ok(Box::new(CobraStretch::new())),
        _ => Err(SessionError::UnknownExercise {
            name: name.to_string(),
        }),
    }
}

/// Names accepted by [`create_exercise`], one canonical name per exercise.
pub fn available_exercises() -> &'static [&'static str] {
    &[
        "straight_leg_raise",
        "prone_straight_leg_raise",
        "bridging",
        "ankle_pumps",
        "cobra_stretch",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_resolves_aliases() {
        assert_eq!(create_exercise("slr").unwrap().name(), "straight_leg_raise");
        assert_eq!(
            create_exercise("ankle_toe_movement").unwrap().name(),
            "ankle_pumps"
        );
        assert_eq!(create_exercise("bridging").unwrap().name(), "bridging");
        assert_eq!(
            create_exercise("any_prone_slr").unwrap().name(),
            "prone_straight_leg_raise"
        );
        assert_eq!(
            create_exercise("cobra").unwrap().name(),
            "cobra_stretch"
        );
    }

    #[test]
    fn test_every_listed_exercise_resolves_to_itself() {
        for name in available_exercises() {
            assert_eq!(create_exercise(name).unwrap().name(), *name);
        }
    }

    #[test]
    fn test_factory_rejects_unknown_exercise() {
        let err = create_exercise("jumping_jacks").unwrap_err();
        assert_eq!(
            err,
            SessionError::UnknownExercise {
                name: "jumping_jacks".to_string()
            }
        );
    }

    #[test]
    fn test_hold_frames_scale_with_fps() {
        assert_eq!(scale_hold_frames(6, 30), 6);
        assert_eq!(scale_hold_frames(6, 10), 2);
        assert_eq!(scale_hold_frames(6, 60), 12);
        // Floor of two frames even at very low rates.
        assert_eq!(scale_hold_frames(3, 5), 2);
    }

    #[test]
    fn test_all_profiles_validate() {
        for name in available_exercises() {
            let exercise = create_exercise(name).unwrap();
            for lenient in [false, true] {
                let profile = exercise.profile(lenient, 30);
                profile
                    .thresholds
                    .validate()
                    .unwrap_or_else(|e| panic!("{name} (lenient={lenient}): {e}"));
                assert!(profile.min_hold_frames >= 2);
                assert!(profile.max_phase_duration_seconds > 0.0);
            }
        }
    }
}
