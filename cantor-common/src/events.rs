//! Event types for the Cantor event system
//!
//! Progress and notification events are fire-and-forget: producers emit them
//! on the [`EventBus`] and never wait for, or depend on, a consumer.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Render job status
///
/// `Pending → Rendering → Writing → Succeeded | Failed | Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    /// Job created, mixdown not started yet
    Pending,
    /// Mixdown in flight (the only cancellable phase)
    Rendering,
    /// Writing the PCM buffer to the destination file
    Writing,
    /// File written successfully
    Succeeded,
    /// Mixdown or write failed
    Failed,
    /// Cancelled by the caller during mixdown
    Cancelled,
}

impl RenderState {
    /// Terminal states end a render job
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RenderState::Succeeded | RenderState::Failed | RenderState::Cancelled
        )
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RenderState::Pending => "pending",
            RenderState::Rendering => "rendering",
            RenderState::Writing => "writing",
            RenderState::Succeeded => "succeeded",
            RenderState::Failed => "failed",
            RenderState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Export progress phase reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    WriteStarted,
    WriteCompleted,
}

/// Cantor event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CantorEvent {
    /// A project became the active session project
    ProjectLoaded {
        name: String,
        file_path: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active project was cleared
    ProjectUnloaded {
        name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Render job moved between states
    RenderStateChanged {
        job_id: Uuid,
        old_state: RenderState,
        new_state: RenderState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Advisory export progress (start and completion of writing)
    ExportProgress {
        job_id: Uuid,
        phase: ExportPhase,
        /// 0.0 - 100.0
        percentage: f64,
        output_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Export ended with an error
    ExportFailed {
        job_id: Uuid,
        /// Stable error kind code (e.g. "RENDER_FAILED")
        kind: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CantorEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            CantorEvent::ProjectLoaded { .. } => "ProjectLoaded",
            CantorEvent::ProjectUnloaded { .. } => "ProjectUnloaded",
            CantorEvent::RenderStateChanged { .. } => "RenderStateChanged",
            CantorEvent::ExportProgress { .. } => "ExportProgress",
            CantorEvent::ExportFailed { .. } => "ExportFailed",
        }
    }
}

/// One-to-many broadcaster for [`CantorEvent`]s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CantorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Events beyond `capacity` that have not been received are dropped for
    /// slow subscribers (they observe a lag error and continue).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CantorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CantorEvent,
    ) -> Result<usize, broadcast::error::SendError<CantorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CantorEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("No subscribers for {}", e.0.event_type());
        }
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
