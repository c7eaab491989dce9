pub mod config;
pub mod error;
pub mod events;
pub mod landmark;
pub mod geometry;
pub mod smoother;
pub mod fsm;
pub mod feedback;
pub mod exercise;
pub mod session;
pub mod pipeline;

pub use config::{PhysiotrackConfig, SessionConfig, ThresholdOverrides, TrackingConfig, VideoConfig};
pub use error::{GeometryError, Result, SessionError, TrackerError};
pub use events::{EventBus, EventFilter, EventReceiver, SessionEvent};
pub use exercise::{
    available_exercises, create_exercise, AnklePumps, Bridging, CobraStretch, Exercise,
    ProneStraightLegRaise, StraightLegRaise,
};
pub use feedback::{FeedbackCode, FeedbackContext};
pub use fsm::{Direction, FormQuality, MachineProfile, Phase, RepMachine, Thresholds};
pub use landmark::{FrameAdapter, Joint, LandmarkFrame, LandmarkPoint, RawDetection, RawLandmark, Side};
pub use pipeline::SessionPipeline;
pub use session::{FrameAnnotation, FrameOutcome, RepEvent, SessionSummary, SessionTracker};
pub use smoother::{SignalSmoother, SmoothedSignal, SmootherTick};
