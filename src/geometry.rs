use crate::error::GeometryError;
use crate::landmark::{Joint, LandmarkFrame, LandmarkPoint};

/// Derived scalar signal for one side of one frame: the exercise's driving
/// value plus the result of its posture gate. Stateless, recomputed every
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct SignalSample {
    /// Driving scalar (typically a joint angle in degrees).
    pub value: f64,
    /// Whether the subject satisfies the exercise's posture preconditions
    /// (lying down, support leg grounded, ...). When false the frame cannot
    /// begin a phase transition.
    pub in_position: bool,
    pub timestamp: f64,
    pub seq: u64,
}

/// Inclusive range check, matching the threshold convention used throughout
/// the exercise definitions.
pub fn between(min: f64, value: f64, max: f64) -> bool {
    value >= min && value <= max
}

pub fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Unsigned angle at vertex `b` of the triangle `a-b-c`, in degrees [0, 180].
/// Standard three-point vector angle (law of cosines on the 2D projection).
pub fn angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let v1 = (a.0 - b.0, a.1 - b.1);
    let v2 = (c.0 - b.0, c.1 - b.1);
    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let mag = (v1.0.hypot(v1.1)) * (v2.0.hypot(v2.1));
    if mag == 0.0 {
        return 0.0;
    }
    (dot / mag).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Signed angle at vertex `b`, in degrees [-180, 180]. The sign follows the
/// 2D cross product of `b->a` and `b->c`; the orientation convention is fixed
/// per exercise and must not vary frame to frame.
pub fn signed_angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let v1 = (a.0 - b.0, a.1 - b.1);
    let v2 = (c.0 - b.0, c.1 - b.1);
    let cross = v1.0 * v2.1 - v1.1 * v2.0;
    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    cross.atan2(dot).to_degrees()
}

fn point_xy(p: &LandmarkPoint) -> (f64, f64) {
    (p.x, p.y)
}

/// Fetch the joints an exercise needs, or report exactly which ones are
/// unavailable so occlusion is handled explicitly upstream.
pub fn require<'a>(
    frame: &'a LandmarkFrame,
    joints: &[Joint],
) -> Result<Vec<&'a LandmarkPoint>, GeometryError> {
    let missing = frame.missing_from(joints);
    if !missing.is_empty() {
        return Err(GeometryError::InsufficientLandmarks { joints: missing });
    }
    // Unwrap is fine: missing_from guarantees presence.
    Ok(joints.iter().map(|j| frame.get(*j).unwrap()).collect())
}

/// Unsigned angle at `b` from three named joints.
pub fn joint_angle(
    frame: &LandmarkFrame,
    a: Joint,
    b: Joint,
    c: Joint,
) -> Result<f64, GeometryError> {
    let pts = require(frame, &[a, b, c])?;
    Ok(angle(point_xy(pts[0]), point_xy(pts[1]), point_xy(pts[2])))
}

/// Ground level estimate: the lowest (largest y, image coordinates) of the
/// hips, ankles and shoulders. Used by the posture gates to test whether a
/// limb rests on the floor.
pub fn ground_level(frame: &LandmarkFrame) -> Result<f64, GeometryError> {
    let joints = [
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];
    let pts = require(frame, &joints)?;
    Ok(pts.iter().map(|p| p.y).fold(f64::MIN, f64::max))
}

/// Whether the upper body is horizontal (supine or prone). True when the
/// shoulder midpoint and hip midpoint sit at nearly the same height.
pub fn upper_body_is_lying_down(frame: &LandmarkFrame) -> Result<bool, GeometryError> {
    let pts = require(
        frame,
        &[
            Joint::LeftShoulder,
            Joint::RightShoulder,
            Joint::LeftHip,
            Joint::RightHip,
        ],
    )?;
    let shoulder_mid = midpoint(point_xy(pts[0]), point_xy(pts[1]));
    let hip_mid = midpoint(point_xy(pts[2]), point_xy(pts[3]));
    Ok((shoulder_mid.1 - hip_mid.1).abs() < 0.15)
}

/// Whether a joint sits close to the estimated ground level.
pub fn near_ground(frame: &LandmarkFrame, joint: Joint) -> Result<bool, GeometryError> {
    let ground = ground_level(frame)?;
    let pts = require(frame, &[joint])?;
    Ok((ground - pts[0].y).abs() < 0.1)
}

/// Whether the toes point toward the floor, the tell for a prone (face-down)
/// posture. True when at least one foot has its toe tip below the heel in
/// image coordinates.
pub fn feet_pointing_down(frame: &LandmarkFrame) -> Result<bool, GeometryError> {
    let pts = require(
        frame,
        &[
            Joint::LeftHeel,
            Joint::LeftFootIndex,
            Joint::RightHeel,
            Joint::RightFootIndex,
        ],
    )?;
    Ok(pts[1].y > pts[0].y || pts[3].y > pts[2].y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{FrameAdapter, RawDetection, RawLandmark};

    pub(crate) fn frame_from(points: &[(Joint, f64, f64)]) -> LandmarkFrame {
        let landmarks = points
            .iter()
            .map(|(j, x, y)| RawLandmark {
                joint: *j,
                x: *x,
                y: *y,
                z: None,
                visibility: 1.0,
            })
            .collect();
        FrameAdapter::default()
            .adapt(&RawDetection::new(1, 0.0, landmarks))
            .unwrap()
    }

    #[test]
    fn test_straight_line_is_180_degrees() {
        let a = angle((0.0, 0.0), (1.0, 0.0), (2.0, 0.0));
        assert!((a - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_right_angle() {
        let a = angle((0.0, 1.0), (0.0, 0.0), (1.0, 0.0));
        assert!((a - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_angle_is_zero() {
        assert_eq!(angle((0.5, 0.5), (0.5, 0.5), (1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_signed_angle_orientation() {
        let ccw = signed_angle((1.0, 0.0), (0.0, 0.0), (0.0, 1.0));
        let cw = signed_angle((0.0, 1.0), (0.0, 0.0), (1.0, 0.0));
        assert!((ccw - 90.0).abs() < 1e-9);
        assert!((cw + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_joint_angle_reports_missing_joints() {
        let frame = frame_from(&[(Joint::LeftHip, 0.5, 0.5), (Joint::LeftKnee, 0.5, 0.7)]);
        let err = joint_angle(&frame, Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle)
            .unwrap_err();
        assert_eq!(
            err,
            GeometryError::InsufficientLandmarks {
                joints: vec![Joint::LeftAnkle]
            }
        );
    }

    #[test]
    fn test_lying_down_detection() {
        // Horizontal torso: shoulders and hips at the same height.
        let lying = frame_from(&[
            (Joint::LeftShoulder, 0.2, 0.6),
            (Joint::RightShoulder, 0.2, 0.62),
            (Joint::LeftHip, 0.5, 0.61),
            (Joint::RightHip, 0.5, 0.63),
        ]);
        assert!(upper_body_is_lying_down(&lying).unwrap());

        // Upright torso: shoulders well above hips.
        let standing = frame_from(&[
            (Joint::LeftShoulder, 0.5, 0.2),
            (Joint::RightShoulder, 0.52, 0.2),
            (Joint::LeftHip, 0.5, 0.55),
            (Joint::RightHip, 0.52, 0.55),
        ]);
        assert!(!upper_body_is_lying_down(&standing).unwrap());
    }

    #[test]
    fn test_feet_orientation_separates_prone_from_supine() {
        // Prone: toes below the heels.
        let prone = frame_from(&[
            (Joint::LeftHeel, 0.77, 0.66),
            (Joint::LeftFootIndex, 0.80, 0.71),
            (Joint::RightHeel, 0.77, 0.68),
            (Joint::RightFootIndex, 0.80, 0.72),
        ]);
        assert!(feet_pointing_down(&prone).unwrap());

        // Supine: toes above the heels.
        let supine = frame_from(&[
            (Joint::LeftHeel, 0.77, 0.70),
            (Joint::LeftFootIndex, 0.80, 0.64),
            (Joint::RightHeel, 0.77, 0.70),
            (Joint::RightFootIndex, 0.80, 0.65),
        ]);
        assert!(!feet_pointing_down(&supine).unwrap());

        // One foot turned down is enough.
        let mixed = frame_from(&[
            (Joint::LeftHeel, 0.77, 0.70),
            (Joint::LeftFootIndex, 0.80, 0.64),
            (Joint::RightHeel, 0.77, 0.68),
            (Joint::RightFootIndex, 0.80, 0.72),
        ]);
        assert!(feet_pointing_down(&mixed).unwrap());
    }

    #[test]
    fn test_near_ground() {
        let frame = frame_from(&[
            (Joint::LeftShoulder, 0.2, 0.6),
            (Joint::RightShoulder, 0.2, 0.6),
            (Joint::LeftHip, 0.5, 0.6),
            (Joint::RightHip, 0.5, 0.6),
            (Joint::LeftAnkle, 0.8, 0.62),
            (Joint::RightAnkle, 0.8, 0.3),
        ]);
        assert!(near_ground(&frame, Joint::LeftAnkle).unwrap());
        assert!(!near_ground(&frame, Joint::RightAnkle).unwrap());
    }
}
