//! Playback sink side
//!
//! **Responsibilities:**
//! - [`PlaybackSink`]: the transport the queue drives
//! - [`TransportControls`]: channel carrying transport commands to the
//!   synchronizer
//! - [`SinkSynchronizer`]: the only component allowed to mutate the sink
//! - [`TransportMonitor`]: folds the sink's updates into observable state
//! - [`VirtualSink`]: in-process transport with a simulated clock

pub mod monitor;
pub mod synchronizer;
pub mod virtual_sink;

use crate::error::{Error, Result};
use cadence_common::events::{RepeatMode, TransportCommand, TransportUpdate};
use cadence_common::QueueEntry;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

pub use monitor::TransportMonitor;
pub use synchronizer::SinkSynchronizer;
pub use virtual_sink::{SinkCall, VirtualSink};

/// Playback transport driven by the [`SinkSynchronizer`]
///
/// Calls must return promptly; a sink that does real work hands it to its
/// own tasks. Indices refer to the sink's playlist, which the synchronizer
/// keeps in step with the queue.
pub trait PlaybackSink: Send + Sync {
    /// Add an entry at the end of the playlist
    fn append(&self, entry: &QueueEntry) -> Result<()>;

    /// Add an entry at `position` (`position <= len`)
    fn insert_at(&self, position: usize, entry: &QueueEntry) -> Result<()>;

    fn remove_at(&self, index: usize) -> Result<()>;

    /// Move the entry at `from` so it ends up at `to`
    fn move_item(&self, from: usize, to: usize) -> Result<()>;

    fn pause(&self) -> Result<()>;

    /// Drop every playlist entry
    fn clear_all(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Prepare the current (or first) entry and start playing
    fn prepare_and_play(&self) -> Result<()>;

    fn seek(&self, position_ms: u64) -> Result<()>;

    fn seek_to_index(&self, index: usize) -> Result<()>;

    fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()>;

    /// Transport state updates, one per observable change
    fn subscribe(&self) -> broadcast::Receiver<TransportUpdate>;
}

/// A transport command plus an optional completion signal
#[derive(Debug)]
pub struct ControlRequest {
    pub command: TransportCommand,
    pub ack: Option<oneshot::Sender<()>>,
}

/// Sending half of the transport control stream
#[derive(Debug, Clone)]
pub struct TransportControls {
    tx: mpsc::UnboundedSender<ControlRequest>,
}

impl TransportControls {
    /// Create a control channel; the receiver goes to the synchronizer
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a command without waiting for it to be applied
    pub fn send(&self, command: TransportCommand) -> Result<()> {
        self.tx
            .send(ControlRequest { command, ack: None })
            .map_err(|_| Error::Sink("synchronizer is not running".to_string()))
    }

    /// Queue a command and wait until the synchronizer has applied it
    pub async fn send_and_wait(&self, command: TransportCommand) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(ControlRequest {
                command,
                ack: Some(ack),
            })
            .map_err(|_| Error::Sink("synchronizer is not running".to_string()))?;

        if done.await.is_err() {
            warn!("Synchronizer dropped {:?} before applying it", command);
            return Err(Error::Sink("synchronizer stopped".to_string()));
        }
        Ok(())
    }
}
