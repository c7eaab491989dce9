use crate::fsm::{Direction, FormQuality, Phase, Thresholds};
use serde::{Deserialize, Serialize};

/// Enumerated form-quality hints for the external renderer. The core never
/// formats or draws these; it only picks the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackCode {
    GoodForm,
    RaiseHigher,
    TooFast,
    HoldSteady,
    GetIntoPosition,
    StayVisible,
}

/// Snapshot of one machine's state, assembled by the session tracker each
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackContext {
    pub phase: Phase,
    pub signal_valid: bool,
    pub in_position: bool,
    /// Peak of the rep in progress (from EnteringActive onward).
    pub peak: f64,
    /// Active duration of the most recently completed rep, if any.
    pub last_rep_seconds: Option<f64>,
    pub last_rep_quality: Option<FormQuality>,
}

/// A rep completed faster than this is flagged as rushed.
const MIN_REP_SECONDS: f64 = 0.5;

/// Derive the per-frame feedback code. Pure function of the given state;
/// recomputed every frame and cheap enough for that.
pub fn annotate(ctx: &FeedbackContext, thresholds: &Thresholds) -> FeedbackCode {
    if !ctx.signal_valid {
        return FeedbackCode::StayVisible;
    }

    match ctx.phase {
        Phase::Idle => FeedbackCode::GetIntoPosition,
        Phase::Rest => match (ctx.last_rep_seconds, ctx.last_rep_quality) {
            (Some(secs), _) if secs < MIN_REP_SECONDS => FeedbackCode::TooFast,
            (_, Some(FormQuality::Good)) => FeedbackCode::GoodForm,
            (_, Some(_)) => FeedbackCode::RaiseHigher,
            _ if !ctx.in_position => FeedbackCode::GetIntoPosition,
            _ => FeedbackCode::GoodForm,
        },
        Phase::EnteringActive | Phase::Active => {
            if peak_reached_ideal(ctx.peak, thresholds) {
                FeedbackCode::HoldSteady
            } else {
                FeedbackCode::RaiseHigher
            }
        }
        Phase::EnteringRest => FeedbackCode::HoldSteady,
    }
}

fn peak_reached_ideal(peak: f64, thresholds: &Thresholds) -> bool {
    match thresholds.direction {
        Direction::Above => peak >= thresholds.ideal_peak,
        Direction::Below => peak <= thresholds.ideal_peak,
    }
}
