use crate::config::PhysiotrackConfig;
use crate::error::{Result, SessionError, TrackerError};
use crate::events::{EventBus, EventFilter, EventReceiver, SessionEvent};
use crate::landmark::RawDetection;
use crate::session::{FrameAnnotation, SessionSummary, SessionTracker};

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum PipelineCommand {
    Frame(RawDetection),
    Stop,
}

/// Async front end for a [`SessionTracker`].
///
/// Owns the tracker inside a worker task so that frame producers and event
/// consumers never share its mutable state. Detections go in through an mpsc
/// channel; session events come out through the broadcast bus; the latest
/// overlay payload is kept behind a read lock for the renderer to poll.
pub struct SessionPipeline {
    command_tx: mpsc::Sender<PipelineCommand>,
    event_bus: Arc<EventBus>,
    annotation: Arc<RwLock<Option<FrameAnnotation>>>,
    worker: JoinHandle<SessionSummary>,
}

impl SessionPipeline {
    /// Build the tracker and start the worker task.
    pub fn start(config: &PhysiotrackConfig) -> Result<Self> {
        let mut tracker = SessionTracker::new(config)?;

        let event_bus = Arc::new(if config.video.debug {
            EventBus::with_debug_logging(config.tracking.event_bus_capacity)
        } else {
            EventBus::new(config.tracking.event_bus_capacity)
        });

        let (command_tx, mut command_rx) =
            mpsc::channel::<PipelineCommand>(config.tracking.frame_channel_capacity);
        let annotation = Arc::new(RwLock::new(None));

        let bus = Arc::clone(&event_bus);
        let annotation_slot = Arc::clone(&annotation);

        let worker = tokio::spawn(async move {
            info!("session worker started");

            while let Some(command) = command_rx.recv().await {
                let raw = match command {
                    PipelineCommand::Frame(raw) => raw,
                    PipelineCommand::Stop => break,
                };

                match tracker.on_frame(&raw) {
                    Ok(outcome) => {
                        *annotation_slot.write().await = Some(outcome.annotation);
                        for event in outcome.events {
                            publish(&bus, event).await;
                        }
                    }
                    Err(err @ SessionError::OutOfOrderFrame { .. }) => {
                        // A producer hiccup, not fatal: drop the frame and
                        // keep the session alive.
                        warn!("{}", err);
                    }
                    Err(err) => {
                        error!("session worker stopping: {}", err);
                        break;
                    }
                }
            }

            let last_timestamp = tracker.last_timestamp();
            let summary = tracker.stop();
            publish(
                &bus,
                SessionEvent::SessionStopped {
                    total_reps: summary.total_reps,
                    timestamp: last_timestamp,
                },
            )
            .await;
            info!("session worker completed");
            summary
        });

        Ok(Self {
            command_tx,
            event_bus,
            annotation,
            worker,
        })
    }

    /// Submit one detection for processing. Fails once the worker has gone
    /// away.
    pub async fn submit(&self, raw: RawDetection) -> Result<()> {
        self.command_tx
            .send(PipelineCommand::Frame(raw))
            .await
            .map_err(|_| {
                TrackerError::component("session_pipeline", "worker task is not running")
            })
    }

    /// Subscribe to the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_bus.subscribe()
    }

    /// Subscribe with a filter and a receiver name for logging.
    pub fn filtered_receiver(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.event_bus.subscribe(), filter, name.to_string())
    }

    /// Latest overlay payload, if a frame has been processed.
    pub async fn annotation(&self) -> Option<FrameAnnotation> {
        self.annotation.read().await.clone()
    }

    /// Stop the session and wait for the final summary.
    pub async fn finish(self) -> Result<SessionSummary> {
        // The worker may already be gone; the join below is authoritative.
        let _ = self.command_tx.send(PipelineCommand::Stop).await;
        self.worker.await.map_err(|e| {
            TrackerError::component("session_pipeline", format!("worker task failed: {e}"))
        })
    }
}

async fn publish(bus: &EventBus, event: SessionEvent) {
    if !bus.has_subscribers() {
        debug!("no subscribers, dropping event: {}", event.description());
        return;
    }
    if let Err(err) = bus.publish(event).await {
        warn!("failed to publish session event: {}", err);
    }
}
