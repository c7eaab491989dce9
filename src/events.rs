use crate::error::EventBusError;
use crate::fsm::{FormQuality, Phase};
use crate::landmark::Side;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events emitted while a tracking session runs. Timestamps are seconds
/// relative to the session's frame clock, matching the incoming detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    /// A repetition was confirmed
    RepCompleted {
        rep_index: u32,
        side: Side,
        start_timestamp: f64,
        end_timestamp: f64,
        peak: f64,
        form_quality: FormQuality,
    },
    /// A machine moved to a new phase
    PhaseChanged {
        side: Side,
        from: Phase,
        to: Phase,
        timestamp: f64,
    },
    /// A rep in progress was discarded after the phase timeout
    RepAbandoned { side: Side, timestamp: f64 },
    /// The subject's landmarks dropped out past the grace period
    SubjectLost { side: Side, timestamp: f64 },
    /// The configured target rep count was reached
    TargetReached { total_reps: u32, timestamp: f64 },
    /// The session was closed
    SessionStopped { total_reps: u32, timestamp: f64 },
}

impl SessionEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> f64 {
        match self {
            SessionEvent::RepCompleted { end_timestamp, .. } => *end_timestamp,
            SessionEvent::PhaseChanged { timestamp, .. } => *timestamp,
            SessionEvent::RepAbandoned { timestamp, .. } => *timestamp,
            SessionEvent::SubjectLost { timestamp, .. } => *timestamp,
            SessionEvent::TargetReached { timestamp, .. } => *timestamp,
            SessionEvent::SessionStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::RepCompleted {
                rep_index,
                side,
                peak,
                form_quality,
                ..
            } => {
                format!(
                    "Rep {} completed ({}, peak {:.1}, {:?} form)",
                    rep_index, side, peak, form_quality
                )
            }
            SessionEvent::PhaseChanged { side, from, to, .. } => {
                format!("Phase changed ({}): {:?} -> {:?}", side, from, to)
            }
            SessionEvent::RepAbandoned { side, .. } => {
                format!("Rep abandoned ({})", side)
            }
            SessionEvent::SubjectLost { side, .. } => {
                format!("Subject lost ({})", side)
            }
            SessionEvent::TargetReached { total_reps, .. } => {
                format!("Target reached: {} reps", total_reps)
            }
            SessionEvent::SessionStopped { total_reps, .. } => {
                format!("Session stopped after {} reps", total_reps)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::RepCompleted { .. } => "rep_completed",
            SessionEvent::PhaseChanged { .. } => "phase_changed",
            SessionEvent::RepAbandoned { .. } => "rep_abandoned",
            SessionEvent::SubjectLost { .. } => "subject_lost",
            SessionEvent::TargetReached { .. } => "target_reached",
            SessionEvent::SessionStopped { .. } => "session_stopped",
        }
    }
}

/// Async event bus for session observers using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: SessionEvent) -> Result<usize, EventBusError> {
        // Log important events at appropriate levels
        match &event {
            SessionEvent::RepCompleted {
                rep_index,
                side,
                form_quality,
                ..
            } => {
                info!("Rep {} completed ({}, {:?} form)", rep_index, side, form_quality);
            }
            SessionEvent::RepAbandoned { side, .. } => {
                warn!("Rep abandoned ({})", side);
            }
            SessionEvent::SubjectLost { side, .. } => {
                warn!("Subject lost ({})", side);
            }
            SessionEvent::TargetReached { total_reps, .. } => {
                info!("Target reached: {} reps", total_reps);
            }
            SessionEvent::SessionStopped { total_reps, .. } => {
                info!("Session stopped after {} reps", total_reps);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept only events for a specific side
    Sides(Vec<Side>),
    /// Custom filter function
    Custom(fn(&SessionEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Sides(sides) => match event {
                SessionEvent::RepCompleted { side, .. }
                | SessionEvent::PhaseChanged { side, .. }
                | SessionEvent::RepAbandoned { side, .. }
                | SessionEvent::SubjectLost { side, .. } => sides.contains(side),
                _ => false,
            },
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<SessionEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SessionEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                    // Continue loop to get next event if this one doesn't match filter
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                    // Continue loop to check next event
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
