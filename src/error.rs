use crate::landmark::Joint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl TrackerError {
    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors produced while deriving geometric signals from a landmark frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Required joints were occluded or below the visibility threshold.
    /// Propagated so the state machine treats the frame as invalid instead
    /// of acting on a fabricated angle.
    #[error("insufficient landmarks: {joints:?}")]
    InsufficientLandmarks { joints: Vec<Joint> },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A frame was submitted after `stop()`.
    #[error("session is closed")]
    SessionClosed,

    #[error("unknown exercise: {name}")]
    UnknownExercise { name: String },

    /// Frame sequence numbers went backwards; the state machine depends on
    /// ordered application of frames.
    #[error("out-of-order frame: seq {seq} after {last_seq}")]
    OutOfOrderFrame { seq: u64, last_seq: u64 },

    /// Threshold overrides produced an unusable transition policy.
    #[error("invalid thresholds: {details}")]
    InvalidThresholds { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, TrackerError>;
