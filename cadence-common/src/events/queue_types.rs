//! Queue mutation events
//!
//! One event per committed mutation, delivered in commit order.

use crate::models::{EntryId, QueueEntry};
use serde::{Deserialize, Serialize};

/// A committed queue mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    /// `entry` now sits at `position`; later entries shifted up by one
    Inserted { position: usize, entry: QueueEntry },

    /// The entry at `index` was removed; later entries shifted down by one
    Removed { index: usize, entry_id: EntryId },

    /// The entries at `from` and `to` swapped places
    Moved { from: usize, to: usize },

    /// Queue emptied, no current entry
    Cleared,

    /// Current index changed without a structural mutation of its own
    /// (explicit selection, or the side effect of a removal or swap)
    CurrentChanged { index: Option<usize> },
}

impl QueueEvent {
    /// Replay this event onto a mirrored list of entries
    ///
    /// Observers that took a snapshot before subscribing stay in sync by
    /// applying every event in order. Events that do not fit the mirror
    /// (out-of-range indices) are ignored and reported as `false`.
    pub fn apply_to(&self, entries: &mut Vec<QueueEntry>) -> bool {
        match self {
            QueueEvent::Inserted { position, entry } => {
                if *position > entries.len() {
                    return false;
                }
                entries.insert(*position, entry.clone());
                true
            }
            QueueEvent::Removed { index, .. } => {
                if *index >= entries.len() {
                    return false;
                }
                entries.remove(*index);
                true
            }
            QueueEvent::Moved { from, to } => {
                if *from >= entries.len() || *to >= entries.len() {
                    return false;
                }
                entries.swap(*from, *to);
                true
            }
            QueueEvent::Cleared => {
                entries.clear();
                true
            }
            QueueEvent::CurrentChanged { .. } => true,
        }
    }

    /// Short event name for logs and SSE event fields
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Inserted { .. } => "Inserted",
            QueueEvent::Removed { .. } => "Removed",
            QueueEvent::Moved { .. } => "Moved",
            QueueEvent::Cleared => "Cleared",
            QueueEvent::CurrentChanged { .. } => "CurrentChanged",
        }
    }
}
