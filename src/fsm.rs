use crate::landmark::Side;
use crate::smoother::SmoothedSignal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Phase of one rep-counting machine. Transitions are total: every
/// (phase, tick) pair maps to exactly one next phase, with invalid ticks
/// mapping to self-transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Initial state: nothing counted until the subject is first seen at
    /// rest, so a session started mid-rep does not produce a phantom count.
    Idle,
    /// Transient: enter threshold crossed, hold not yet satisfied.
    EnteringActive,
    /// Subject holds the exercise's target position.
    Active,
    /// Transient: exit threshold crossed, hold not yet satisfied.
    EnteringRest,
    /// Between reps.
    Rest,
}

impl Phase {
    /// Whether the abandonment timeout applies in this phase.
    fn is_timed(&self) -> bool {
        !matches!(self, Phase::Idle | Phase::Rest)
    }
}

/// Which way the driving signal moves when the subject enters the active
/// position. A bridge raises the hip angle; a straight leg raise lowers the
/// raise angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Above,
    Below,
}

/// Enter/exit thresholds with hysteresis, plus the ideal peak used for form
/// scoring. `exit` sits on the rest side of `enter` so a noisy value near the
/// boundary cannot oscillate the phase every frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub enter: f64,
    pub exit: f64,
    pub direction: Direction,
    /// Peak value a well-executed rep should reach.
    pub ideal_peak: f64,
}

impl Thresholds {
    pub fn hysteresis_margin(&self) -> f64 {
        (self.enter - self.exit).abs()
    }

    fn crossed_enter(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value >= self.enter,
            Direction::Below => value <= self.enter,
        }
    }

    fn crossed_exit(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value <= self.exit,
            Direction::Below => value >= self.exit,
        }
    }

    /// More extreme of two values in the active direction.
    fn further(&self, a: f64, b: f64) -> f64 {
        match self.direction {
            Direction::Above => a.max(b),
            Direction::Below => a.min(b),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let ok = match self.direction {
            Direction::Above => self.exit < self.enter && self.ideal_peak >= self.enter,
            Direction::Below => self.exit > self.enter && self.ideal_peak <= self.enter,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "thresholds out of order for {:?} direction: enter={} exit={} ideal_peak={}",
                self.direction, self.enter, self.exit, self.ideal_peak
            ))
        }
    }
}

/// Resolved per-machine policy. Built once at session start from the exercise
/// definition and the session's lenient/strict mode; immutable afterwards.
#[derive(Debug, Clone, Copy)]
pub struct MachineProfile {
    pub thresholds: Thresholds,
    /// Consecutive qualifying frames required to confirm a transition.
    pub min_hold_frames: u32,
    /// Force-reset guard for a subject leaving the frame mid-rep.
    pub max_phase_duration_seconds: f64,
}

/// How close the active-phase peak came to the ideal target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormQuality {
    Good,
    Fair,
    Poor,
}

/// One confirmed repetition, as reported by a single machine. The session
/// tracker assigns the dense rep index.
#[derive(Debug, Clone, Copy)]
pub struct RepSummary {
    pub side: Side,
    /// When the enter crossing began (EnteringActive entry).
    pub start_timestamp: f64,
    /// When the exit crossing began (EnteringRest entry), not the later
    /// confirmation tick.
    pub end_timestamp: f64,
    pub peak: f64,
    pub form_quality: FormQuality,
}

/// Per-frame input to the machine: the smoothed driving signal plus the
/// exercise's posture-gate verdict for this side.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub signal: SmoothedSignal,
    pub in_position: bool,
    pub window_reset: bool,
}

/// Net effect of one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepResult {
    pub phase_changed: Option<(Phase, Phase)>,
    pub rep: Option<RepSummary>,
    pub abandoned: bool,
}

/// Rep-counting state machine for one side of one exercise.
///
/// Owned exclusively by a session; applies frames strictly in order. An
/// invalid smoothed signal never advances a hold counter and never triggers a
/// transition: it is a no-op tick, except that the abandonment timeout still
/// runs on its timestamp.
#[derive(Debug)]
pub struct RepMachine {
    profile: MachineProfile,
    side: Side,
    phase: Phase,
    hold_count: u32,
    phase_entered_at: f64,
    /// Candidate rep start: timestamp of the EnteringActive entry.
    pending_start: f64,
    /// Candidate rep end: timestamp of the EnteringRest entry.
    pending_end: f64,
    peak: f64,
    abandoned_count: u64,
}

impl RepMachine {
    pub fn new(profile: MachineProfile, side: Side) -> Self {
        Self {
            profile,
            side,
            phase: Phase::Idle,
            hold_count: 0,
            phase_entered_at: 0.0,
            pending_start: 0.0,
            pending_end: 0.0,
            peak: 0.0,
            abandoned_count: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Peak of the rep currently in progress; meaningful from EnteringActive
    /// until the rep resolves.
    pub fn current_peak(&self) -> f64 {
        self.peak
    }

    pub fn abandoned_count(&self) -> u64 {
        self.abandoned_count
    }

    fn set_phase(&mut self, phase: Phase, timestamp: f64) {
        debug!(side = %self.side, from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
        self.phase_entered_at = timestamp;
        self.hold_count = 0;
    }

    /// Apply one frame's tick. Returns the net phase change and at most one
    /// completed rep; rep creation is atomic relative to the tick.
    pub fn advance(&mut self, tick: Tick) -> StepResult {
        let mut result = StepResult::default();
        let from = self.phase;
        let ts = tick.signal.timestamp;

        // Abandonment guard runs on every tick, valid or not: a subject who
        // left the frame mid-rep stops producing valid signals but the clock
        // keeps moving.
        if self.phase.is_timed()
            && ts - self.phase_entered_at > self.profile.max_phase_duration_seconds
        {
            warn!(
                side = %self.side,
                phase = ?self.phase,
                elapsed = ts - self.phase_entered_at,
                "phase timed out, discarding rep in progress"
            );
            self.abandoned_count += 1;
            self.set_phase(Phase::Rest, ts);
            result.phase_changed = Some((from, Phase::Rest));
            result.abandoned = true;
            return result;
        }

        // A dropout past the grace period invalidates in-flight holds: the
        // transient phases revert to the state they came from.
        if tick.window_reset {
            match self.phase {
                Phase::EnteringActive => self.set_phase(Phase::Rest, ts),
                Phase::EnteringRest => self.set_phase(Phase::Active, ts),
                _ => {}
            }
            if self.phase != from {
                result.phase_changed = Some((from, self.phase));
                return result;
            }
        }

        if !tick.signal.valid {
            return result;
        }

        let value = tick.signal.value;
        let th = self.profile.thresholds;

        match self.phase {
            Phase::Idle => {
                // Wait for the subject to first appear at rest.
                if th.crossed_exit(value) && tick.in_position {
                    self.set_phase(Phase::Rest, ts);
                }
            }
            Phase::Rest => {
                if th.crossed_enter(value) && tick.in_position {
                    self.pending_start = ts;
                    self.peak = value;
                    self.set_phase(Phase::EnteringActive, ts);
                    self.hold_count = 1;
                    self.maybe_confirm_active(ts);
                }
            }
            Phase::EnteringActive => {
                if th.crossed_enter(value) && tick.in_position {
                    self.peak = th.further(self.peak, value);
                    self.hold_count += 1;
                    self.maybe_confirm_active(ts);
                } else {
                    // False start: brief overshoot reverted before the hold
                    // completed. Nothing is counted.
                    self.set_phase(Phase::Rest, ts);
                }
            }
            Phase::Active => {
                if tick.in_position {
                    self.peak = th.further(self.peak, value);
                }
                if th.crossed_exit(value) {
                    self.pending_end = ts;
                    self.set_phase(Phase::EnteringRest, ts);
                    self.hold_count = 1;
                    result.rep = self.maybe_confirm_rest(ts);
                }
            }
            Phase::EnteringRest => {
                if th.crossed_exit(value) {
                    self.hold_count += 1;
                    result.rep = self.maybe_confirm_rest(ts);
                } else {
                    // Signal bounced back above the exit threshold; the rep
                    // is still in progress.
                    self.set_phase(Phase::Active, ts);
                }
            }
        }

        if self.phase != from {
            result.phase_changed = Some((from, self.phase));
        }
        result
    }

    fn maybe_confirm_active(&mut self, ts: f64) {
        if self.hold_count >= self.profile.min_hold_frames {
            self.set_phase(Phase::Active, ts);
        }
    }

    fn maybe_confirm_rest(&mut self, ts: f64) -> Option<RepSummary> {
        if self.hold_count < self.profile.min_hold_frames {
            return None;
        }
        let summary = RepSummary {
            side: self.side,
            start_timestamp: self.pending_start,
            end_timestamp: self.pending_end,
            peak: self.peak,
            form_quality: self.form_quality(),
        };
        self.set_phase(Phase::Rest, ts);
        Some(summary)
    }

    fn form_quality(&self) -> FormQuality {
        let th = self.profile.thresholds;
        let (progress, needed) = match th.direction {
            Direction::Above => (self.peak - th.enter, th.ideal_peak - th.enter),
            Direction::Below => (th.enter - self.peak, th.enter - th.ideal_peak),
        };
        if needed <= 0.0 || progress >= needed {
            FormQuality::Good
        } else if progress >= needed / 2.0 {
            FormQuality::Fair
        } else {
            FormQuality::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_SECS: f64 = 0.1; // 10 fps

    fn profile(min_hold_frames: u32) -> MachineProfile {
        MachineProfile {
            thresholds: Thresholds {
                enter: 55.0,
                exit: 20.0,
                direction: Direction::Above,
                ideal_peak: 60.0,
            },
            min_hold_frames,
            max_phase_duration_seconds: 10.0,
        }
    }

    fn tick(value: f64, frame: u64) -> Tick {
        Tick {
            signal: SmoothedSignal {
                value,
                valid: true,
                timestamp: frame as f64 * FRAME_SECS,
                seq: frame,
            },
            in_position: true,
            window_reset: false,
        }
    }

    fn invalid_tick(frame: u64, window_reset: bool) -> Tick {
        Tick {
            signal: SmoothedSignal {
                value: 0.0,
                valid: false,
                timestamp: frame as f64 * FRAME_SECS,
                seq: frame,
            },
            in_position: false,
            window_reset,
        }
    }

    fn run(machine: &mut RepMachine, values: &[f64]) -> Vec<RepSummary> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| machine.advance(tick(*v, i as u64 + 1)).rep)
            .collect()
    }

    #[test]
    fn test_worked_example_one_rep_closing_at_frame_nine() {
        // 10 fps, min_hold_frames=3, enter=55/exit=20,
        // signal [10,10,10,60,62,65,65,65,12,10,10] -> exactly one rep.
        let mut machine = RepMachine::new(profile(3), Side::Both);
        let reps = run(
            &mut machine,
            &[10.0, 10.0, 10.0, 60.0, 62.0, 65.0, 65.0, 65.0, 12.0, 10.0, 10.0],
        );
        assert_eq!(reps.len(), 1);
        let rep = reps[0];
        // Active interval opened at the frame-4 crossing and closed at the
        // frame-9 crossing.
        assert!((rep.start_timestamp - 4.0 * FRAME_SECS).abs() < 1e-9);
        assert!((rep.end_timestamp - 9.0 * FRAME_SECS).abs() < 1e-9);
        assert_eq!(rep.peak, 65.0);
        assert_eq!(rep.form_quality, FormQuality::Good);
        assert_eq!(machine.phase(), Phase::Rest);
    }

    #[test]
    fn test_square_wave_counts_every_cycle() {
        let mut machine = RepMachine::new(profile(2), Side::Both);
        let mut values = vec![10.0, 10.0];
        for _ in 0..5 {
            values.extend_from_slice(&[70.0, 70.0, 70.0, 70.0, 10.0, 10.0, 10.0, 10.0]);
        }
        let reps = run(&mut machine, &values);
        assert_eq!(reps.len(), 5);
    }

    #[test]
    fn test_debounce_rejects_single_frame_crossing() {
        let mut machine = RepMachine::new(profile(3), Side::Both);
        let reps = run(
            &mut machine,
            &[10.0, 10.0, 70.0, 10.0, 10.0, 70.0, 70.0, 10.0, 10.0],
        );
        assert!(reps.is_empty());
        assert_eq!(machine.phase(), Phase::Rest);
    }

    #[test]
    fn test_hysteresis_band_cannot_oscillate_the_phase() {
        let mut machine = RepMachine::new(profile(2), Side::Both);
        // Enter active, then oscillate strictly between exit(20) and enter(55).
        let mut values = vec![10.0, 10.0, 70.0, 70.0];
        for _ in 0..20 {
            values.extend_from_slice(&[25.0, 50.0]);
        }
        let reps = run(&mut machine, &values);
        assert!(reps.is_empty());
        assert_eq!(machine.phase(), Phase::Active);
    }

    #[test]
    fn test_invalid_ticks_do_not_advance_or_reset_holds() {
        let mut machine = RepMachine::new(profile(3), Side::Both);
        machine.advance(tick(10.0, 1));
        machine.advance(tick(70.0, 2));
        machine.advance(tick(70.0, 3));
        assert_eq!(machine.phase(), Phase::EnteringActive);

        // Short dropout: no-op ticks, hold counter untouched.
        machine.advance(invalid_tick(4, false));
        machine.advance(invalid_tick(5, false));
        assert_eq!(machine.phase(), Phase::EnteringActive);

        // Hold resumes and completes on the next valid frame.
        let result = machine.advance(tick(70.0, 6));
        assert_eq!(machine.phase(), Phase::Active);
        assert!(result.rep.is_none());
    }

    #[test]
    fn test_grace_exceeded_resets_in_flight_hold() {
        let mut machine = RepMachine::new(profile(3), Side::Both);
        machine.advance(tick(10.0, 1));
        machine.advance(tick(70.0, 2));
        assert_eq!(machine.phase(), Phase::EnteringActive);

        let result = machine.advance(invalid_tick(3, true));
        assert_eq!(machine.phase(), Phase::Rest);
        assert_eq!(result.phase_changed, Some((Phase::EnteringActive, Phase::Rest)));
        assert!(!result.abandoned);
    }

    #[test]
    fn test_timeout_discards_abandoned_rep() {
        let mut machine = RepMachine::new(
            MachineProfile {
                max_phase_duration_seconds: 1.0,
                ..profile(2)
            },
            Side::Both,
        );
        machine.advance(tick(10.0, 1));
        machine.advance(tick(70.0, 2));
        machine.advance(tick(70.0, 3));
        assert_eq!(machine.phase(), Phase::Active);

        // Subject leaves the frame; only invalid ticks arrive.
        let mut result = StepResult::default();
        for frame in 4..20 {
            result = machine.advance(invalid_tick(frame, false));
            if result.abandoned {
                break;
            }
        }
        assert!(result.abandoned);
        assert!(result.rep.is_none());
        assert_eq!(machine.phase(), Phase::Rest);
        assert_eq!(machine.abandoned_count(), 1);
    }

    #[test]
    fn test_idle_waits_for_rest_before_counting() {
        // Session starts with the subject already mid-rep; that rep must not
        // be counted.
        let mut machine = RepMachine::new(profile(2), Side::Both);
        let reps = run(&mut machine, &[70.0, 70.0, 70.0, 10.0, 10.0]);
        assert!(reps.is_empty());
        assert_eq!(machine.phase(), Phase::Rest);

        // The next full cycle counts.
        let reps = run(&mut machine, &[70.0, 70.0, 10.0, 10.0]);
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn test_entering_rest_bounce_returns_to_active_without_event() {
        let mut machine = RepMachine::new(profile(3), Side::Both);
        machine.advance(tick(10.0, 1));
        machine.advance(tick(70.0, 2));
        machine.advance(tick(70.0, 3));
        machine.advance(tick(70.0, 4));
        assert_eq!(machine.phase(), Phase::Active);

        machine.advance(tick(15.0, 5));
        assert_eq!(machine.phase(), Phase::EnteringRest);
        let result = machine.advance(tick(70.0, 6));
        assert_eq!(machine.phase(), Phase::Active);
        assert!(result.rep.is_none());
    }

    #[test]
    fn test_form_quality_from_peak() {
        let mut poor = RepMachine::new(profile(1), Side::Both);
        // Peak 56 barely crosses enter=55, far from ideal 60: poor form.
        let reps = run(&mut poor, &[10.0, 56.0, 56.0, 10.0]);
        assert_eq!(reps[0].form_quality, FormQuality::Poor);

        let mut fair = RepMachine::new(profile(1), Side::Both);
        let reps = run(&mut fair, &[10.0, 58.0, 58.0, 10.0]);
        assert_eq!(reps[0].form_quality, FormQuality::Fair);

        let mut good = RepMachine::new(profile(1), Side::Both);
        let reps = run(&mut good, &[10.0, 62.0, 62.0, 10.0]);
        assert_eq!(reps[0].form_quality, FormQuality::Good);
    }

    #[test]
    fn test_below_direction_mirrors_thresholds() {
        // Straight-leg-raise style signal: the raise angle falls as the leg
        // lifts.
        let profile = MachineProfile {
            thresholds: Thresholds {
                enter: 150.0,
                exit: 160.0,
                direction: Direction::Below,
                ideal_peak: 110.0,
            },
            min_hold_frames: 2,
            max_phase_duration_seconds: 30.0,
        };
        let mut machine = RepMachine::new(profile, Side::Left);
        let reps = run(
            &mut machine,
            &[170.0, 170.0, 140.0, 120.0, 105.0, 140.0, 170.0, 170.0],
        );
        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].peak, 105.0);
        assert_eq!(reps[0].form_quality, FormQuality::Good);
        assert_eq!(reps[0].side, Side::Left);
    }

    #[test]
    fn test_out_of_position_blocks_entry() {
        let mut machine = RepMachine::new(profile(2), Side::Both);
        machine.advance(tick(10.0, 1));
        assert_eq!(machine.phase(), Phase::Rest);

        // Crossing while out of position must not start a rep.
        let mut t = tick(70.0, 2);
        t.in_position = false;
        machine.advance(t);
        assert_eq!(machine.phase(), Phase::Rest);
    }

    #[test]
    fn test_threshold_validation() {
        let good = Thresholds {
            enter: 55.0,
            exit: 20.0,
            direction: Direction::Above,
            ideal_peak: 60.0,
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.hysteresis_margin(), 35.0);

        let inverted = Thresholds {
            enter: 20.0,
            exit: 55.0,
            direction: Direction::Above,
            ideal_peak: 60.0,
        };
        assert!(inverted.validate().is_err());
    }
}
