//! Transport control and transport state types
//!
//! Commands flow from the session towards the playback sink; updates flow
//! back from the sink to observers.

use crate::models::EntryId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Repeat behaviour of the playback sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatMode::Off => write!(f, "off"),
            RepeatMode::One => write!(f, "one"),
            RepeatMode::All => write!(f, "all"),
        }
    }
}

impl FromStr for RepeatMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown repeat mode '{}'",
                other
            ))),
        }
    }
}

/// Buffering state reported by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingState {
    /// Nothing loaded
    #[default]
    Idle,
    /// Loading media before playback can continue
    Buffering,
    /// Enough media loaded to play
    Ready,
    /// Reached the end of the playlist
    Ended,
}

/// Imperative transport request issued by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TransportCommand {
    Play,
    Pause,
    /// Pause and stop the transport (issued before the queue is torn down)
    Stop,
    Seek { position_ms: u64 },
    SeekToIndex { index: usize },
    /// Move by `offset` entries relative to the current one (+1 next, -1 previous)
    SeekRelative { offset: i64 },
    SetRepeatMode { mode: RepeatMode },
}

/// One observable change of the sink's transport state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportUpdate {
    Playing { playing: bool },
    Buffering { state: BufferingState },
    Position { position_ms: u64 },
    Duration { duration_ms: u64 },
    /// Emitted exactly when the sink begins playing a different entry
    ///
    /// `entry_id` names the entry at `index` in the sink's own playlist, so
    /// observers can follow the entry even if the queue moved on meanwhile.
    CurrentIndex {
        index: Option<usize>,
        entry_id: Option<EntryId>,
    },
}

/// Folded view of the transport update stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransportState {
    pub playing: bool,
    pub buffering: BufferingState,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub current_index: Option<usize>,
}

impl TransportState {
    /// Fold one update into the state
    ///
    /// Returns `false` when the update did not change anything.
    pub fn apply(&mut self, update: TransportUpdate) -> bool {
        match update {
            TransportUpdate::Playing { playing } => replace(&mut self.playing, playing),
            TransportUpdate::Buffering { state } => replace(&mut self.buffering, state),
            TransportUpdate::Position { position_ms } => replace(&mut self.position_ms, position_ms),
            TransportUpdate::Duration { duration_ms } => replace(&mut self.duration_ms, duration_ms),
            TransportUpdate::CurrentIndex { index, .. } => replace(&mut self.current_index, index),
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
