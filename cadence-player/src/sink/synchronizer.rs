//! Sink Synchronizer
//!
//! Applies queue events and transport commands to the [`PlaybackSink`] in the
//! order they arrive. It is the only caller of the sink's mutating methods.
//!
//! **Event mapping:**
//! - `Inserted` → `append` (or `insert_at` inside the playlist); the first
//!   entry into an empty playlist also triggers `prepare_and_play`
//! - `Removed` → `remove_at`
//! - `Moved` (swap) → one sink move, or two when the positions are not adjacent
//! - `Cleared` → `pause`, `clear_all`, `stop`, strictly in that order
//! - `CurrentChanged` → nothing (the sink is the source of that change)
//!
//! Queue events take priority over pending transport commands, so a command
//! always sees a playlist that already reflects every committed mutation.

use super::{ControlRequest, PlaybackSink};
use crate::error::Result;
use crate::queue::{QueueStore, QueueSubscription};
use cadence_common::events::{QueueEvent, TransportCommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SinkSynchronizer {
    sink: Arc<dyn PlaybackSink>,
    store: Arc<QueueStore>,
    queue_events: QueueSubscription,
    controls: mpsc::UnboundedReceiver<ControlRequest>,
    /// Length of the sink playlist as mirrored so far
    mirrored_len: usize,
}

impl SinkSynchronizer {
    /// Create new synchronizer and bring the sink up to the current queue
    ///
    /// Subscribes to the store atomically with a snapshot; entries already
    /// queued are appended to the sink without starting playback.
    pub fn new(
        sink: Arc<dyn PlaybackSink>,
        store: Arc<QueueStore>,
        controls: mpsc::UnboundedReceiver<ControlRequest>,
    ) -> Self {
        let (snapshot, queue_events) = store.subscribe_with_snapshot();
        let mut synchronizer = Self {
            sink,
            store,
            queue_events,
            controls,
            mirrored_len: 0,
        };

        for entry in snapshot.entries() {
            synchronizer.call("append", synchronizer.sink.append(entry));
            synchronizer.mirrored_len += 1;
        }
        if !snapshot.is_empty() {
            info!("Seeded sink with {} queued entries", snapshot.len());
        }
        synchronizer
    }

    /// Process events and commands until shutdown or until the store is gone
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Sink synchronizer started");
        let mut controls_open = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Sink synchronizer shutting down");
                    break;
                }

                event = self.queue_events.recv() => match event {
                    Some(event) => self.apply_queue_event(event),
                    None => {
                        info!("Queue store dropped, sink synchronizer stopping");
                        break;
                    }
                },

                request = self.controls.recv(), if controls_open => match request {
                    Some(request) => self.apply_control(request),
                    None => {
                        debug!("Transport control channel closed");
                        controls_open = false;
                    }
                },
            }
        }
    }

    fn call(&self, operation: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!("Sink {} failed: {}", operation, e);
        }
    }

    /// Mirror one committed queue mutation
    pub fn apply_queue_event(&mut self, event: QueueEvent) {
        debug!("Sink sync: {}", event.name());
        match event {
            QueueEvent::Inserted { position, entry } => {
                let was_empty = self.mirrored_len == 0;
                if position >= self.mirrored_len {
                    self.call("append", self.sink.append(&entry));
                } else {
                    self.call("insert_at", self.sink.insert_at(position, &entry));
                }
                self.mirrored_len += 1;

                if was_empty {
                    self.call("prepare_and_play", self.sink.prepare_and_play());
                }
            }
            QueueEvent::Removed { index, .. } => {
                self.call("remove_at", self.sink.remove_at(index));
                self.mirrored_len = self.mirrored_len.saturating_sub(1);
            }
            QueueEvent::Moved { from, to } => self.mirror_swap(from, to),
            QueueEvent::Cleared => {
                self.call("pause", self.sink.pause());
                self.call("clear_all", self.sink.clear_all());
                self.call("stop", self.sink.stop());
                self.mirrored_len = 0;
            }
            QueueEvent::CurrentChanged { .. } => {}
        }
    }

    /// Swap two playlist positions using move semantics
    fn mirror_swap(&self, from: usize, to: usize) {
        if from == to {
            return;
        }
        self.call("move", self.sink.move_item(from, to));

        // After the first move the displaced entry sits one step toward `from`
        if from.abs_diff(to) > 1 {
            let displaced = if from < to { to - 1 } else { to + 1 };
            self.call("move", self.sink.move_item(displaced, from));
        }
    }

    /// Apply one transport command, then acknowledge it
    pub fn apply_control(&mut self, request: ControlRequest) {
        let ControlRequest { command, ack } = request;
        debug!("Sink sync: command {:?}", command);

        match command {
            TransportCommand::Play => self.call("prepare_and_play", self.sink.prepare_and_play()),
            TransportCommand::Pause => self.call("pause", self.sink.pause()),
            TransportCommand::Stop => {
                self.call("pause", self.sink.pause());
                self.call("stop", self.sink.stop());
            }
            TransportCommand::Seek { position_ms } => self.call("seek", self.sink.seek(position_ms)),
            TransportCommand::SeekToIndex { index } => {
                if index < self.mirrored_len {
                    self.call("seek_to_index", self.sink.seek_to_index(index));
                } else {
                    warn!(
                        "Ignoring seek to index {} (playlist len {})",
                        index, self.mirrored_len
                    );
                }
            }
            TransportCommand::SeekRelative { offset } => {
                // With nothing selected, next lands on the first entry
                let current = self.store.current_index().map_or(-1, |i| i as i64);
                let target = current + offset;
                if target >= 0 && (target as usize) < self.mirrored_len {
                    self.call("seek_to_index", self.sink.seek_to_index(target as usize));
                    self.call("prepare_and_play", self.sink.prepare_and_play());
                } else {
                    debug!("No entry at relative offset {} from {}", offset, current);
                }
            }
            TransportCommand::SetRepeatMode { mode } => {
                self.call("set_repeat_mode", self.sink.set_repeat_mode(mode))
            }
        }

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}
