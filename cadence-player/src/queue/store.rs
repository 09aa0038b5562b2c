//! Queue Store
//!
//! Authoritative ordered list of queue entries plus the current index.
//!
//! **Responsibilities:**
//! - Queue mutations (insert, remove, move, clear, set current)
//! - Point-in-time snapshots
//! - Ordered, lossless event delivery to every subscriber
//!
//! Every mutation, every snapshot and every subscription runs under one
//! mutex. Events are handed to per-subscriber unbounded channels while the
//! lock is still held, so the order subscribers observe is exactly the commit
//! order and a snapshot taken together with a subscription can neither miss
//! nor duplicate an event. Sending on an unbounded channel never waits, so a
//! slow subscriber cannot stall a mutator.
//!
//! Nothing that can suspend (stream resolution, sink calls) may run while the
//! lock is held; callers resolve first and apply the finished entries here.

use crate::error::{Error, Result};
use cadence_common::events::QueueEvent;
use cadence_common::{EntryId, QueueEntry};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Consistent point-in-time copy of the queue
///
/// Cheap to take: entries are shared with the store until the next mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    entries: Arc<Vec<QueueEntry>>,
    current_index: Option<usize>,
}

impl QueueSnapshot {
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Entry at the current index, if any
    pub fn current(&self) -> Option<&QueueEntry> {
        self.current_index.and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copy of the entries
    pub fn to_vec(&self) -> Vec<QueueEntry> {
        self.entries.as_ref().clone()
    }
}

/// Receiving end of a queue event subscription
///
/// Yields every event committed after the subscription point, in commit
/// order. Returns `None` once the store has been dropped.
#[derive(Debug)]
pub struct QueueSubscription {
    rx: mpsc::UnboundedReceiver<QueueEvent>,
}

impl QueueSubscription {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        self.rx.try_recv().ok()
    }

    /// Convert into a `Stream` of events
    pub fn into_stream(self) -> UnboundedReceiverStream<QueueEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

struct QueueState {
    entries: Arc<Vec<QueueEntry>>,
    current_index: Option<usize>,
    subscribers: Vec<mpsc::UnboundedSender<QueueEvent>>,
}

impl QueueState {
    fn publish(&mut self, event: QueueEvent) {
        // Closed receivers are pruned here rather than on drop
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_current(&mut self, index: Option<usize>) {
        if self.current_index != index {
            self.current_index = index;
            self.publish(QueueEvent::CurrentChanged { index });
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(Error::IndexError {
                index,
                bound: self.entries.len(),
            })
        }
    }

    /// `current + 1` (or 0), shifted by `offset`, clamped into `[0, len]`
    fn default_position(&self, offset: isize) -> usize {
        let base = self.current_index.map_or(0, |i| i + 1) as i64;
        let len = self.entries.len() as i64;
        (base + offset as i64).clamp(0, len) as usize
    }

    fn check_new_ids<'a>(&self, batch: impl IntoIterator<Item = &'a QueueEntry>) -> Result<()> {
        let mut seen: HashSet<&EntryId> = self.entries.iter().map(QueueEntry::id).collect();
        for entry in batch {
            if !seen.insert(entry.id()) {
                return Err(Error::DuplicateEntry {
                    id: entry.id().to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert_batch(&mut self, batch: Vec<QueueEntry>, offset: isize) -> Vec<usize> {
        let start = self.default_position(offset);
        let count = batch.len();

        let mut events = Vec::with_capacity(count);
        {
            let entries = Arc::make_mut(&mut self.entries);
            for (i, entry) in batch.into_iter().enumerate() {
                entries.insert(start + i, entry.clone());
                events.push(QueueEvent::Inserted {
                    position: start + i,
                    entry,
                });
            }
        }
        for event in events {
            self.publish(event);
        }

        // Keep pointing at the same logical entry
        if let Some(current) = self.current_index {
            if count > 0 && start <= current {
                self.set_current(Some(current + count));
            }
        }

        (start..start + count).collect()
    }
}

/// Thread-safe queue store
///
/// Shared as `Arc<QueueStore>` between the session coordinator, the sink
/// synchronizer and observers.
pub struct QueueStore {
    state: Mutex<QueueState>,
}

impl QueueStore {
    /// Create new empty queue store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: Arc::new(Vec::new()),
                current_index: None,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking observer cannot leave the state half-mutated: every
        // mutation validates before it touches the entries.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent point-in-time copy of the queue
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            entries: Arc::clone(&state.entries),
            current_index: state.current_index,
        }
    }

    /// Subscribe to future events (no replay)
    pub fn subscribe(&self) -> QueueSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        QueueSubscription { rx }
    }

    /// Take a snapshot and subscribe atomically
    ///
    /// Every mutation is either reflected in the snapshot or delivered on the
    /// subscription, never both and never neither.
    pub fn subscribe_with_snapshot(&self) -> (QueueSnapshot, QueueSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.subscribers.push(tx);
        let snapshot = QueueSnapshot {
            entries: Arc::clone(&state.entries),
            current_index: state.current_index,
        };
        (snapshot, QueueSubscription { rx })
    }

    /// Insert one entry at the default position shifted by `offset`
    ///
    /// Returns the actual insertion position.
    pub fn insert(&self, entry: QueueEntry, offset: isize) -> Result<usize> {
        let mut state = self.lock();
        state.check_new_ids([&entry])?;
        let id = entry.id().clone();
        let position = state.insert_batch(vec![entry], offset)[0];
        debug!("Inserted {} at position {}", id, position);
        Ok(position)
    }

    /// Insert a batch contiguously at the default position shifted by `offset`
    ///
    /// The batch keeps its order and is never interleaved with another
    /// writer's entries. Fails without mutating if any id is already queued.
    pub fn insert_all(&self, entries: Vec<QueueEntry>, offset: isize) -> Result<Vec<usize>> {
        Ok(self
            .insert_all_if(entries, offset, || true)?
            .unwrap_or_default())
    }

    /// Like [`insert_all`](Self::insert_all), but only if `guard` holds
    ///
    /// `guard` is evaluated under the store lock, so its answer cannot go
    /// stale before the entries land. Returns `Ok(None)` when it refuses.
    pub fn insert_all_if<F>(
        &self,
        entries: Vec<QueueEntry>,
        offset: isize,
        guard: F,
    ) -> Result<Option<Vec<usize>>>
    where
        F: FnOnce() -> bool,
    {
        let mut state = self.lock();
        if !guard() {
            return Ok(None);
        }
        state.check_new_ids(&entries)?;
        let count = entries.len();
        let positions = state.insert_batch(entries, offset);
        if let Some(first) = positions.first() {
            debug!("Inserted {} entries starting at position {}", count, first);
        }
        Ok(Some(positions))
    }

    /// Remove the entry at `index`
    ///
    /// Emits `Removed`, followed by `Cleared` if the queue became empty.
    pub fn remove_at(&self, index: usize) -> Result<QueueEntry> {
        let mut state = self.lock();
        state.check_index(index)?;

        let removed = Arc::make_mut(&mut state.entries).remove(index);
        let len = state.entries.len();
        debug!("Removed {} from position {}", removed.id(), index);

        state.publish(QueueEvent::Removed {
            index,
            entry_id: removed.id().clone(),
        });

        if len == 0 {
            state.current_index = None;
            state.publish(QueueEvent::Cleared);
            return Ok(removed);
        }

        let current = match state.current_index {
            Some(c) if index < c => Some(c - 1),
            // Removed the current entry: the one that slid into its place
            // becomes current (or the new last one)
            Some(c) if index == c => Some(c.min(len - 1)),
            other => other,
        };
        state.set_current(current);

        Ok(removed)
    }

    /// Swap the entries at `from` and `to`
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let mut state = self.lock();
        state.check_index(from)?;
        state.check_index(to)?;

        Arc::make_mut(&mut state.entries).swap(from, to);
        debug!("Moved queue entry {} <-> {}", from, to);
        state.publish(QueueEvent::Moved { from, to });

        let current = match state.current_index {
            Some(c) if c == from => Some(to),
            Some(c) if c == to => Some(from),
            other => other,
        };
        state.set_current(current);
        Ok(())
    }

    /// Remove every entry and reset the current index
    pub fn clear(&self) {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries = Arc::new(Vec::new());
        state.current_index = None;
        state.publish(QueueEvent::Cleared);
        debug!("Cleared queue ({} entries)", count);
    }

    /// Select the current entry (`None` = no selection)
    pub fn set_current_index(&self, index: Option<usize>) -> Result<()> {
        let mut state = self.lock();
        if let Some(i) = index {
            state.check_index(i)?;
        }
        state.set_current(index);
        Ok(())
    }

    /// Select the entry with `id` as current, wherever it is now
    ///
    /// Returns its position.
    pub fn set_current_entry(&self, id: &EntryId) -> Result<usize> {
        let mut state = self.lock();
        let position = state
            .entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| Error::UnknownEntry { id: id.to_string() })?;
        state.set_current(Some(position));
        Ok(position)
    }

    /// Validate `index` against the bounds at this instant
    pub fn check_index(&self, index: usize) -> Result<()> {
        self.lock().check_index(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.lock().current_index
    }

    /// Entry at the current index, if any
    pub fn current(&self) -> Option<QueueEntry> {
        let state = self.lock();
        state.current_index.and_then(|i| state.entries.get(i).cloned())
    }

    /// Look up an entry by id
    pub fn entry(&self, id: &EntryId) -> Option<QueueEntry> {
        self.lock().entries.iter().find(|e| e.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Number of live subscriptions (closed ones are pruned on next event)
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::{StreamHandle, Track};

    fn entry(id: &str) -> QueueEntry {
        QueueEntry::with_id(
            id.into(),
            "test",
            Track::new(id, id.to_uppercase()),
            StreamHandle {
                id: id.to_string(),
                uri: format!("mem://{}", id),
                mime_type: None,
            },
        )
    }

    fn ids(store: &QueueStore) -> Vec<String> {
        store
            .snapshot()
            .entries()
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    fn drain(sub: &mut QueueSubscription) -> Vec<QueueEvent> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    fn store_with(entries: &[&str]) -> QueueStore {
        let store = QueueStore::new();
        store
            .insert_all(entries.iter().map(|id| entry(id)).collect(), 0)
            .unwrap();
        store
    }

    #[test]
    fn test_insert_into_empty_queue_goes_to_front() {
        let store = QueueStore::new();
        assert_eq!(store.insert(entry("a"), 0).unwrap(), 0);
        assert_eq!(store.current_index(), None);
    }

    #[test]
    fn test_insert_offset_is_clamped_to_end() {
        let store = store_with(&["a", "b", "c"]);
        store.set_current_index(Some(0)).unwrap();

        // 0 + 1 + 5 = 6, clamped to len 3
        assert_eq!(store.insert(entry("d"), 5).unwrap(), 3);
        assert_eq!(ids(&store), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_insert_negative_offset_clamps_to_front_and_keeps_current() {
        let store = store_with(&["a", "b"]);
        store.set_current_index(Some(1)).unwrap();
        let mut sub = store.subscribe();

        assert_eq!(store.insert(entry("z"), -10).unwrap(), 0);
        assert_eq!(ids(&store), vec!["z", "a", "b"]);
        // Still "b"
        assert_eq!(store.current_index(), Some(2));

        let events = drain(&mut sub);
        assert!(matches!(events[0], QueueEvent::Inserted { position: 0, .. }));
        assert_eq!(events[1], QueueEvent::CurrentChanged { index: Some(2) });
    }

    #[test]
    fn test_insert_after_current() {
        let store = store_with(&["a", "b", "c"]);
        store.set_current_index(Some(1)).unwrap();

        assert_eq!(store.insert(entry("n"), 0).unwrap(), 2);
        assert_eq!(ids(&store), vec!["a", "b", "n", "c"]);
        assert_eq!(store.current_index(), Some(1));
    }

    #[test]
    fn test_insert_all_keeps_batch_order() {
        let store = store_with(&["a", "b"]);
        store.set_current_index(Some(0)).unwrap();
        let mut sub = store.subscribe();

        let positions = store.insert_all(vec![entry("x"), entry("y")], 0).unwrap();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(ids(&store), vec!["a", "x", "y", "b"]);

        let events = drain(&mut sub);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], QueueEvent::Inserted { position: 1, entry } if entry.id().as_str() == "x"));
        assert!(matches!(&events[1], QueueEvent::Inserted { position: 2, entry } if entry.id().as_str() == "y"));
    }

    #[test]
    fn test_duplicate_ids_rejected_without_mutation() {
        let store = store_with(&["a"]);

        let result = store.insert(entry("a"), 0);
        assert!(matches!(result, Err(Error::DuplicateEntry { .. })));

        let result = store.insert_all(vec![entry("b"), entry("b")], 0);
        assert!(matches!(result, Err(Error::DuplicateEntry { .. })));
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn test_insert_all_if_refused_guard_leaves_queue_untouched() {
        let store = QueueStore::new();
        let mut sub = store.subscribe();

        let result = store.insert_all_if(vec![entry("a")], 0, || false).unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
        assert!(drain(&mut sub).is_empty());
    }

    #[test]
    fn test_remove_before_current_shifts_index() {
        let store = store_with(&["a", "b", "c"]);
        store.set_current_index(Some(2)).unwrap();

        let removed = store.remove_at(0).unwrap();
        assert_eq!(removed.id().as_str(), "a");
        assert_eq!(ids(&store), vec!["b", "c"]);
        assert_eq!(store.current_index(), Some(1));
        assert_eq!(store.current().unwrap().id().as_str(), "c");
    }

    #[test]
    fn test_remove_current_keeps_position_when_possible() {
        let store = store_with(&["a", "b", "c"]);
        store.set_current_index(Some(1)).unwrap();
        store.remove_at(1).unwrap();
        assert_eq!(store.current_index(), Some(1));
        assert_eq!(store.current().unwrap().id().as_str(), "c");

        // Removing the last entry while it is current points at the new last one
        store.remove_at(1).unwrap();
        assert_eq!(store.current_index(), Some(0));
    }

    #[test]
    fn test_remove_last_entry_emits_removed_then_cleared() {
        let store = store_with(&["a"]);
        store.set_current_index(Some(0)).unwrap();
        let mut sub = store.subscribe();

        store.remove_at(0).unwrap();

        let events = drain(&mut sub);
        assert_eq!(
            events,
            vec![
                QueueEvent::Removed { index: 0, entry_id: "a".into() },
                QueueEvent::Cleared,
            ]
        );
        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.current_index(), None);
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let store = store_with(&["a", "b"]);
        match store.remove_at(2) {
            Err(Error::IndexError { index, bound }) => {
                assert_eq!(index, 2);
                assert_eq!(bound, 2);
            }
            other => panic!("expected IndexError, got {:?}", other),
        }
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn test_move_swaps_and_tracks_current() {
        let store = store_with(&["a", "b", "c"]);
        store.set_current_index(Some(0)).unwrap();
        let mut sub = store.subscribe();

        store.move_item(0, 2).unwrap();
        assert_eq!(ids(&store), vec!["c", "b", "a"]);
        assert_eq!(store.current_index(), Some(2));
        assert_eq!(
            drain(&mut sub),
            vec![
                QueueEvent::Moved { from: 0, to: 2 },
                QueueEvent::CurrentChanged { index: Some(2) },
            ]
        );
    }

    #[test]
    fn test_move_out_of_bounds_leaves_queue_unchanged() {
        let store = store_with(&["a", "b"]);
        let mut sub = store.subscribe();

        let result = store.move_item(0, 5);
        assert!(matches!(result, Err(Error::IndexError { index: 5, bound: 2 })));
        assert_eq!(ids(&store), vec!["a", "b"]);
        assert!(drain(&mut sub).is_empty());
    }

    #[test]
    fn test_clear_resets_everything() {
        let store = store_with(&["a", "b"]);
        store.set_current_index(Some(1)).unwrap();
        let mut sub = store.subscribe();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.current_index(), None);
        assert_eq!(drain(&mut sub), vec![QueueEvent::Cleared]);
    }

    #[test]
    fn test_set_current_index_validation() {
        let store = store_with(&["a", "b"]);
        assert!(matches!(
            store.set_current_index(Some(2)),
            Err(Error::IndexError { index: 2, bound: 2 })
        ));
        store.set_current_index(Some(1)).unwrap();
        store.set_current_index(None).unwrap();
        assert_eq!(store.current_index(), None);

        // Null is legal on an empty queue too
        QueueStore::new().set_current_index(None).unwrap();
    }

    #[test]
    fn test_set_current_index_only_emits_on_change() {
        let store = store_with(&["a", "b"]);
        let mut sub = store.subscribe();
        store.set_current_index(Some(1)).unwrap();
        store.set_current_index(Some(1)).unwrap();
        assert_eq!(
            drain(&mut sub),
            vec![QueueEvent::CurrentChanged { index: Some(1) }]
        );
    }

    #[test]
    fn test_set_current_entry_follows_identity() {
        let store = store_with(&["a", "b", "c"]);
        store.move_item(0, 2).unwrap();

        assert_eq!(store.set_current_entry(&"a".into()).unwrap(), 2);
        assert_eq!(store.current_index(), Some(2));
        assert!(matches!(
            store.set_current_entry(&"gone".into()),
            Err(Error::UnknownEntry { .. })
        ));
        assert_eq!(store.current_index(), Some(2));
    }

    #[test]
    fn test_snapshot_is_idempotent_and_isolated() {
        let store = store_with(&["a", "b"]);
        let first = store.snapshot();
        let second = store.snapshot();
        assert_eq!(first, second);

        store.insert(entry("c"), 0).unwrap();
        // Earlier snapshots are unaffected by later mutations
        assert_eq!(first.len(), 2);
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn test_subscribe_with_snapshot_has_no_gap() {
        let store = store_with(&["a"]);
        let (snapshot, mut sub) = store.subscribe_with_snapshot();
        store.insert(entry("b"), 0).unwrap();

        let mut mirror = snapshot.to_vec();
        for event in drain(&mut sub) {
            assert!(event.apply_to(&mut mirror));
        }
        assert_eq!(mirror, store.snapshot().to_vec());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let store = QueueStore::new();
        let sub = store.subscribe();
        let _kept = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);

        drop(sub);
        store.clear();
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    fn test_entry_lookup() {
        let store = store_with(&["a", "b"]);
        assert_eq!(store.entry(&"b".into()).unwrap().track().title, "B");
        assert!(store.entry(&"zz".into()).is_none());
    }

    #[tokio::test]
    async fn test_subscription_as_stream_ends_with_store() {
        use futures::StreamExt;

        let store = QueueStore::new();
        let events = store.subscribe().into_stream();
        store.insert(entry("a"), 0).unwrap();
        store.clear();
        drop(store);

        let names: Vec<&str> = events.map(|e| e.name()).collect().await;
        assert_eq!(names, vec!["Inserted", "Cleared"]);
    }
}
