//! Event types for the cadence event system
//!
//! Two kinds of event delivery are used:
//! - **Queue events** ([`QueueEvent`]): lossless, strictly ordered, one
//!   hand-off channel per subscriber, owned by the queue store.
//! - **EventBus** (tokio::broadcast): one-to-many notifications for
//!   observers that may drop events under load (SSE clients, status UIs).

mod queue_types;
mod transport_types;

pub use queue_types::QueueEvent;
pub use transport_types::{
    BufferingState, RepeatMode, TransportCommand, TransportState, TransportUpdate,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notifications broadcast on the [`EventBus`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CadenceEvent {
    /// The playback sink reported a transport change
    TransportChanged {
        update: TransportUpdate,
        timestamp: DateTime<Utc>,
    },

    /// A track or query could not be turned into queue entries
    ///
    /// Triggers:
    /// - SSE: show a notice to the user
    ResolutionFailed {
        /// Query or track description the failure refers to
        subject: String,
        /// Human readable reason
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The active extension was rebound (None = no extension bound)
    ExtensionChanged {
        extension_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl CadenceEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            CadenceEvent::TransportChanged { .. } => "TransportChanged",
            CadenceEvent::ResolutionFailed { .. } => "ResolutionFailed",
            CadenceEvent::ExtensionChanged { .. } => "ExtensionChanged",
        }
    }
}

/// Broadcast bus for [`CadenceEvent`]s
///
/// Subscribers that fall more than `capacity` events behind lose the oldest
/// events and observe a `Lagged` error on their receiver.
pub struct EventBus {
    tx: broadcast::Sender<CadenceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use cadence_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CadenceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CadenceEvent,
    ) -> Result<usize, broadcast::error::SendError<CadenceEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CadenceEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
