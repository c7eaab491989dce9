use std::collections::VecDeque;
use tracing::debug;

/// Fraction of a second of history kept in the rolling window.
const WINDOW_SECONDS: f64 = 0.3;
/// Samples required before the filter output is trusted.
const MIN_SAMPLES: usize = 3;

/// A geometry signal after temporal filtering. `valid` is false while the
/// window is still filling and during detector dropout; an invalid signal
/// must be treated as a no-op tick by the state machine.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedSignal {
    pub value: f64,
    pub valid: bool,
    pub timestamp: f64,
    pub seq: u64,
}

/// Result of feeding one frame into the smoother.
#[derive(Debug, Clone, Copy)]
pub struct SmootherTick {
    pub signal: SmoothedSignal,
    /// True on the tick where a run of invalid frames first exceeded the
    /// grace period. The state machine resets its hold counters on this
    /// signal; shorter dropouts leave them untouched.
    pub window_reset: bool,
}

/// Median filter over a bounded rolling window of the driving signal.
///
/// The median is preferred over a moving average because single-frame
/// detector glitches produce angle spikes that a mean would leak into the
/// output. Validity rules: at least [`MIN_SAMPLES`] frames in the window, and
/// no unresolved dropout longer than the grace period. Once the grace period
/// is exceeded the window is cleared and must refill from fresh frames, so
/// stale pre-dropout data can never drive a transition.
#[derive(Debug)]
pub struct SignalSmoother {
    window: VecDeque<f64>,
    capacity: usize,
    grace_frames: u32,
    consecutive_invalid: u32,
    scratch: Vec<f64>,
}

impl SignalSmoother {
    pub fn new(fps: u32, grace_frames: u32) -> Self {
        let capacity = ((fps as f64 * WINDOW_SECONDS).ceil() as usize).max(MIN_SAMPLES);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            grace_frames,
            consecutive_invalid: 0,
            scratch: Vec::with_capacity(capacity),
        }
    }

    pub fn window_capacity(&self) -> usize {
        self.capacity
    }

    /// Feed one frame's raw signal value, or `None` when the frame had no
    /// usable signal (missing subject or occluded joints).
    pub fn push(&mut self, value: Option<f64>, timestamp: f64, seq: u64) -> SmootherTick {
        let mut window_reset = false;

        match value {
            Some(v) => {
                self.consecutive_invalid = 0;
                if self.window.len() == self.capacity {
                    self.window.pop_front();
                }
                self.window.push_back(v);
            }
            None => {
                self.consecutive_invalid += 1;
                if self.consecutive_invalid == self.grace_frames + 1 {
                    debug!(
                        "signal dropout exceeded grace period ({} frames), clearing window",
                        self.grace_frames
                    );
                    self.window.clear();
                    window_reset = true;
                }
            }
        }

        let valid = self.window.len() >= MIN_SAMPLES && self.consecutive_invalid == 0;
        let value = if self.window.is_empty() {
            0.0
        } else {
            self.median()
        };

        SmootherTick {
            signal: SmoothedSignal {
                value,
                valid,
                timestamp,
                seq,
            },
            window_reset,
        }
    }

    fn median(&mut self) -> f64 {
        self.scratch.clear();
        self.scratch.extend(self.window.iter());
        self.scratch
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = self.scratch.len();
        if n % 2 == 1 {
            self.scratch[n / 2]
        } else {
            (self.scratch[n / 2 - 1] + self.scratch[n / 2]) / 2.0
        }
    }
}
