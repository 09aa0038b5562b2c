//! Transport monitor
//!
//! Consumes the sink's [`TransportUpdate`] stream, keeps the folded
//! [`TransportState`] in a watch channel, rebroadcasts every update on the
//! [`EventBus`] and writes the sink's current entry back into the queue store.

use super::PlaybackSink;
use crate::queue::QueueStore;
use cadence_common::events::{CadenceEvent, EventBus, TransportState, TransportUpdate};
use cadence_common::EntryId;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub struct TransportMonitor {
    store: Arc<QueueStore>,
    bus: Arc<EventBus>,
    updates: broadcast::Receiver<TransportUpdate>,
    state: watch::Sender<TransportState>,
}

impl TransportMonitor {
    /// Create new monitor subscribed to `sink`
    ///
    /// Returns the monitor and a receiver for the folded transport state.
    pub fn new(
        sink: &dyn PlaybackSink,
        store: Arc<QueueStore>,
        bus: Arc<EventBus>,
    ) -> (Self, watch::Receiver<TransportState>) {
        let (state, state_rx) = watch::channel(TransportState::default());
        let monitor = Self {
            store,
            bus,
            updates: sink.subscribe(),
            state,
        };
        (monitor, state_rx)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Transport monitor started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                update = self.updates.recv() => match update {
                    Ok(update) => self.handle(update),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Transport monitor lagged, {} updates skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Sink update stream closed");
                        break;
                    }
                },
            }
        }
        info!("Transport monitor stopped");
    }

    /// Fold one update and propagate it
    pub fn handle(&self, update: TransportUpdate) {
        trace!("Transport update {:?}", update);

        if let TransportUpdate::CurrentIndex { index, entry_id } = &update {
            self.sync_current(*index, entry_id.as_ref());
        }

        self.state.send_if_modified(|state| state.apply(update.clone()));
        self.bus.emit_lossy(CadenceEvent::TransportChanged {
            update,
            timestamp: Utc::now(),
        });
    }

    fn sync_current(&self, index: Option<usize>, entry_id: Option<&EntryId>) {
        let result = match entry_id {
            Some(id) => self.store.set_current_entry(id).map(Some),
            None => self.store.set_current_index(None).map(|_| None),
        };
        match result {
            Ok(position) => debug!("Queue current index now {:?}", position),
            // The entry was removed from the queue after the sink started it
            Err(e) => debug!("Sink current index {:?} not applied: {}", index, e),
        }
    }
}
