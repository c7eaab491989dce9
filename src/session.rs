use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::PhysiotrackConfig;
use crate::events::SessionEvent;
use crate::exercise::{create_exercise, Exercise};
use crate::feedback::{self, FeedbackCode, FeedbackContext};
use crate::fsm::{FormQuality, MachineProfile, Phase, RepMachine, Tick};
use crate::landmark::{FrameAdapter, RawDetection, Side};
use crate::smoother::SignalSmoother;
use crate::error::SessionError;

/// One confirmed repetition with its session-wide index. Indices are dense
/// and 1-based across all sides, in confirmation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepEvent {
    pub rep_index: u32,
    pub side: Side,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    pub duration_seconds: f64,
    pub peak: f64,
    pub form_quality: FormQuality,
}

/// Per-side slice of a frame annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneAnnotation {
    pub side: Side,
    pub phase: Phase,
    pub feedback: FeedbackCode,
    /// Smoothed driving signal, present only when debug output is on and the
    /// signal is currently valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<f64>,
}

/// Overlay payload for the external renderer, rebuilt every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameAnnotation {
    pub seq: u64,
    pub timestamp: f64,
    pub rep_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_reps: Option<u32>,
    pub lanes: Vec<LaneAnnotation>,
}

/// End-of-session (or mid-session) report. Safe to request at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub exercise: String,
    pub lenient_mode: bool,
    pub total_reps: u32,
    pub reps: Vec<RepEvent>,
    pub total_frames: u64,
    pub missing_frames: u64,
    pub invalid_frames: u64,
    pub abandoned_reps: u64,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_reps: Option<u32>,
    pub target_reached: bool,
}

/// Everything one frame produced: events for the bus plus the render payload.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub reps: Vec<RepEvent>,
    pub events: Vec<SessionEvent>,
    pub annotation: FrameAnnotation,
}

/// One side's smoothing and counting state.
#[derive(Debug)]
struct Lane {
    side: Side,
    smoother: SignalSmoother,
    machine: RepMachine,
    /// A SubjectLost event was emitted and the signal has not recovered yet.
    lost: bool,
    last_rep_seconds: Option<f64>,
    last_rep_quality: Option<FormQuality>,
}

/// Stateful tracker for one exercise session.
///
/// Consumes raw detections strictly in sequence order and drives one
/// [`RepMachine`] per side. All mutation happens through [`on_frame`]; the
/// tracker is single-owner and never shared across frames in flight.
///
/// [`on_frame`]: SessionTracker::on_frame
#[derive(Debug)]
pub struct SessionTracker {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    exercise: Box<dyn Exercise>,
    adapter: FrameAdapter,
    profile: MachineProfile,
    lanes: Vec<Lane>,
    lenient_mode: bool,
    debug_signals: bool,
    target_reps: Option<u32>,
    target_reached: bool,
    closed: bool,
    last_seq: Option<u64>,
    first_timestamp: Option<f64>,
    last_timestamp: f64,
    total_frames: u64,
    missing_frames: u64,
    invalid_frames: u64,
    rep_events: Vec<RepEvent>,
    last_annotation: Option<FrameAnnotation>,
}

impl SessionTracker {
    pub fn new(config: &PhysiotrackConfig) -> Result<Self, SessionError> {
        let exercise = create_exercise(&config.session.exercise)?;
        Self::with_exercise(exercise, config)
    }

    /// Build a tracker around an already-constructed exercise definition.
    pub fn with_exercise(
        exercise: Box<dyn Exercise>,
        config: &PhysiotrackConfig,
    ) -> Result<Self, SessionError> {
        let profile = config.thresholds.apply(
            exercise.profile(config.session.lenient_mode, config.session.fps),
        );
        profile
            .thresholds
            .validate()
            .map_err(|details| SessionError::InvalidThresholds { details })?;

        let lanes = exercise
            .sides()
            .iter()
            .map(|&side| Lane {
                side,
                smoother: SignalSmoother::new(
                    config.session.fps,
                    config.tracking.grace_frames,
                ),
                machine: RepMachine::new(profile, side),
                lost: false,
                last_rep_seconds: None,
                last_rep_quality: None,
            })
            .collect();

        let session_id = Uuid::new_v4();
        info!(
            %session_id,
            exercise = exercise.name(),
            lenient = config.session.lenient_mode,
            fps = config.session.fps,
            "session tracker started"
        );

        Ok(Self {
            session_id,
            started_at: Utc::now(),
            exercise,
            adapter: FrameAdapter::new(config.tracking.visibility_threshold),
            profile,
            lanes,
            lenient_mode: config.session.lenient_mode,
            debug_signals: config.video.debug,
            target_reps: config.session.target_reps,
            target_reached: false,
            closed: false,
            last_seq: None,
            first_timestamp: None,
            last_timestamp: 0.0,
            total_frames: 0,
            missing_frames: 0,
            invalid_frames: 0,
            rep_events: Vec::new(),
            last_annotation: None,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn exercise_name(&self) -> &str {
        self.exercise.name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_events.len() as u32
    }

    /// The overlay payload from the most recent frame, if any.
    pub fn annotation(&self) -> Option<&FrameAnnotation> {
        self.last_annotation.as_ref()
    }

    /// Apply one raw detection. Frames must arrive with strictly increasing
    /// sequence numbers; an empty detection is a valid no-op tick, not an
    /// error.
    pub fn on_frame(&mut self, raw: &RawDetection) -> Result<FrameOutcome, SessionError> {
        if self.closed {
            return Err(SessionError::SessionClosed);
        }
        if let Some(last_seq) = self.last_seq {
            if raw.seq <= last_seq {
                return Err(SessionError::OutOfOrderFrame {
                    seq: raw.seq,
                    last_seq,
                });
            }
        }
        self.last_seq = Some(raw.seq);
        self.total_frames += 1;
        self.first_timestamp.get_or_insert(raw.timestamp);
        self.last_timestamp = raw.timestamp;

        let frame = self.adapter.adapt(raw);
        if frame.is_none() {
            self.missing_frames += 1;
        }

        let mut reps = Vec::new();
        let mut events = Vec::new();
        let mut lane_annotations = Vec::with_capacity(self.lanes.len());
        let mut occluded = false;

        for lane in &mut self.lanes {
            let (value, in_position) = match &frame {
                Some(frame) => match self.exercise.compute(frame, lane.side) {
                    Ok(sample) => (Some(sample.value), sample.in_position),
                    Err(err) => {
                        trace!(side = %lane.side, seq = raw.seq, %err, "no signal this frame");
                        occluded = true;
                        (None, false)
                    }
                },
                None => (None, false),
            };

            let tick = lane.smoother.push(value, raw.timestamp, raw.seq);

            if tick.window_reset && !lane.lost {
                lane.lost = true;
                events.push(SessionEvent::SubjectLost {
                    side: lane.side,
                    timestamp: raw.timestamp,
                });
            }
            if tick.signal.valid {
                lane.lost = false;
            }

            let step = lane.machine.advance(Tick {
                signal: tick.signal,
                in_position,
                window_reset: tick.window_reset,
            });

            if let Some((from, to)) = step.phase_changed {
                // A new attempt clears the previous rep from the feedback
                // context, so a rushed rep is not flagged forever.
                if from == Phase::Rest && to != Phase::Rest {
                    lane.last_rep_seconds = None;
                    lane.last_rep_quality = None;
                }
                events.push(SessionEvent::PhaseChanged {
                    side: lane.side,
                    from,
                    to,
                    timestamp: raw.timestamp,
                });
            }
            if step.abandoned {
                events.push(SessionEvent::RepAbandoned {
                    side: lane.side,
                    timestamp: raw.timestamp,
                });
            }
            if let Some(summary) = step.rep {
                let rep = RepEvent {
                    rep_index: self.rep_events.len() as u32 + 1,
                    side: summary.side,
                    start_timestamp: summary.start_timestamp,
                    end_timestamp: summary.end_timestamp,
                    duration_seconds: summary.end_timestamp - summary.start_timestamp,
                    peak: summary.peak,
                    form_quality: summary.form_quality,
                };
                debug!(
                    rep_index = rep.rep_index,
                    side = %rep.side,
                    peak = rep.peak,
                    "rep confirmed"
                );
                lane.last_rep_seconds = Some(rep.duration_seconds);
                lane.last_rep_quality = Some(rep.form_quality);
                events.push(SessionEvent::RepCompleted {
                    rep_index: rep.rep_index,
                    side: rep.side,
                    start_timestamp: rep.start_timestamp,
                    end_timestamp: rep.end_timestamp,
                    peak: rep.peak,
                    form_quality: rep.form_quality,
                });
                self.rep_events.push(rep.clone());
                reps.push(rep);

                if let Some(target) = self.target_reps {
                    if !self.target_reached && self.rep_events.len() as u32 >= target {
                        self.target_reached = true;
                        events.push(SessionEvent::TargetReached {
                            total_reps: self.rep_events.len() as u32,
                            timestamp: raw.timestamp,
                        });
                    }
                }
            }

            let context = FeedbackContext {
                phase: lane.machine.phase(),
                signal_valid: tick.signal.valid,
                in_position,
                peak: lane.machine.current_peak(),
                last_rep_seconds: lane.last_rep_seconds,
                last_rep_quality: lane.last_rep_quality,
            };
            let code = feedback::annotate(&context, &self.profile.thresholds);
            lane_annotations.push(LaneAnnotation {
                side: lane.side,
                phase: lane.machine.phase(),
                feedback: code,
                signal: if self.debug_signals && tick.signal.valid {
                    Some(tick.signal.value)
                } else {
                    None
                },
            });
        }

        if occluded {
            self.invalid_frames += 1;
        }

        let annotation = FrameAnnotation {
            seq: raw.seq,
            timestamp: raw.timestamp,
            rep_count: self.rep_events.len() as u32,
            target_reps: self.target_reps,
            lanes: lane_annotations,
        };
        self.last_annotation = Some(annotation.clone());

        Ok(FrameOutcome {
            reps,
            events,
            annotation,
        })
    }

    /// Timestamp of the most recently accepted frame.
    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// Close the session and return the final report. Subsequent frames are
    /// rejected with [`SessionError::SessionClosed`]; calling stop again is
    /// harmless.
    pub fn stop(&mut self) -> SessionSummary {
        if !self.closed {
            self.closed = true;
            info!(
                exercise = self.exercise.name(),
                total_reps = self.rep_events.len(),
                "session stopped"
            );
        }
        self.summary()
    }

    /// Snapshot of the session so far. Idempotent; valid before and after
    /// [`stop`](SessionTracker::stop).
    pub fn summary(&self) -> SessionSummary {
        let duration_seconds = self
            .first_timestamp
            .map(|first| self.last_timestamp - first)
            .unwrap_or(0.0);
        SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            exercise: self.exercise.name().to_string(),
            lenient_mode: self.lenient_mode,
            total_reps: self.rep_events.len() as u32,
            reps: self.rep_events.clone(),
            total_frames: self.total_frames,
            missing_frames: self.missing_frames,
            invalid_frames: self.invalid_frames,
            abandoned_reps: self.lanes.iter().map(|l| l.machine.abandoned_count()).sum(),
            duration_seconds,
            target_reps: self.target_reps,
            target_reached: self.target_reached,
        }
    }
}
