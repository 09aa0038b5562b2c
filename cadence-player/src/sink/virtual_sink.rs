//! In-process playback sink with a simulated clock
//!
//! Plays nothing; it keeps a playlist, advances a position clock while
//! playing and reports every observable change as a [`TransportUpdate`]:
//! - one update per change, nothing for calls that change nothing
//! - position never decreases while the same entry keeps playing, except
//!   for an explicit seek
//! - `CurrentIndex` exactly when a different entry starts
//!
//! Every call is recorded in a call log for inspection.

use super::PlaybackSink;
use crate::error::{Error, Result};
use cadence_common::events::{BufferingState, RepeatMode, TransportState, TransportUpdate};
use cadence_common::{EntryId, QueueEntry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Length assumed for entries whose track has no duration
pub const DEFAULT_TRACK_MS: u64 = 180_000;

/// One recorded sink call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Append(EntryId),
    InsertAt(usize, EntryId),
    RemoveAt(usize),
    Move(usize, usize),
    Pause,
    ClearAll,
    Stop,
    PrepareAndPlay,
    Seek(u64),
    SeekToIndex(usize),
    SetRepeatMode(RepeatMode),
}

struct VirtualState {
    playlist: Vec<QueueEntry>,
    current: Option<usize>,
    current_id: Option<EntryId>,
    playing: bool,
    buffering: BufferingState,
    position_ms: u64,
    duration_ms: u64,
    repeat: RepeatMode,
    default_track_ms: u64,
    calls: Vec<SinkCall>,
    pending: Vec<TransportUpdate>,
}

impl VirtualState {
    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.playlist.len() {
            Ok(())
        } else {
            Err(Error::Sink(format!(
                "index {} out of bounds (playlist len {})",
                index,
                self.playlist.len()
            )))
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.pending.push(TransportUpdate::Playing { playing });
        }
    }

    fn set_buffering(&mut self, state: BufferingState) {
        if self.buffering != state {
            self.buffering = state;
            self.pending.push(TransportUpdate::Buffering { state });
        }
    }

    fn set_position(&mut self, position_ms: u64) {
        if self.position_ms != position_ms {
            self.position_ms = position_ms;
            self.pending.push(TransportUpdate::Position { position_ms });
        }
    }

    fn set_duration(&mut self, duration_ms: u64) {
        if self.duration_ms != duration_ms {
            self.duration_ms = duration_ms;
            self.pending.push(TransportUpdate::Duration { duration_ms });
        }
    }

    /// Start the entry at `index` from the beginning
    fn begin(&mut self, index: usize) {
        let entry = &self.playlist[index];
        let id = entry.id().clone();
        let duration = entry.track().duration_ms.unwrap_or(self.default_track_ms);

        self.current = Some(index);
        if self.current_id.as_ref() != Some(&id) {
            debug!("Virtual sink now at {} ({})", index, id);
            self.current_id = Some(id.clone());
            self.pending.push(TransportUpdate::CurrentIndex {
                index: Some(index),
                entry_id: Some(id),
            });
        }
        self.set_duration(duration);
        self.set_position(0);
    }

    /// Drop the current entry without starting another
    fn release(&mut self) {
        self.current = None;
        if self.current_id.take().is_some() {
            self.pending.push(TransportUpdate::CurrentIndex {
                index: None,
                entry_id: None,
            });
        }
        self.set_duration(0);
        self.set_position(0);
    }

    fn advance(&mut self, elapsed_ms: u64) {
        let Some(current) = self.current else { return };
        if !self.playing {
            return;
        }

        let position = self.position_ms.saturating_add(elapsed_ms);
        if position < self.duration_ms {
            self.set_position(position);
            return;
        }

        self.set_position(self.duration_ms);
        let len = self.playlist.len();
        match self.repeat {
            RepeatMode::One => self.begin(current),
            RepeatMode::All => self.begin((current + 1) % len),
            RepeatMode::Off if current + 1 < len => self.begin(current + 1),
            RepeatMode::Off => {
                self.set_playing(false);
                self.set_buffering(BufferingState::Ended);
            }
        }
    }
}

/// Virtual transport
///
/// Share as `Arc<VirtualSink>`; [`spawn_clock`](Self::spawn_clock) drives the
/// position while playing.
pub struct VirtualSink {
    inner: Mutex<VirtualState>,
    updates: broadcast::Sender<TransportUpdate>,
}

impl VirtualSink {
    /// Create new idle sink
    pub fn new(default_track_ms: u64) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(VirtualState {
                playlist: Vec::new(),
                current: None,
                current_id: None,
                playing: false,
                buffering: BufferingState::Idle,
                position_ms: 0,
                duration_ms: 0,
                repeat: RepeatMode::Off,
                default_track_ms,
                calls: Vec::new(),
                pending: Vec::new(),
            }),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock and publish the updates it produced
    fn apply<T>(
        &self,
        call: Option<SinkCall>,
        f: impl FnOnce(&mut VirtualState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        if let Some(call) = call {
            trace!("Virtual sink call {:?}", call);
            state.calls.push(call);
        }
        let result = f(&mut state);
        for update in state.pending.drain(..) {
            let _ = self.updates.send(update);
        }
        result
    }

    /// Advance the clock by `elapsed_ms`
    pub fn advance(&self, elapsed_ms: u64) {
        let _ = self.apply(None, |state| {
            state.advance(elapsed_ms);
            Ok(())
        });
    }

    /// Advance the clock every `tick` until `shutdown` fires
    pub fn spawn_clock(
        self: Arc<Self>,
        tick: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let tick_ms = tick.as_millis() as u64;
            info!("Virtual sink clock started ({}ms tick)", tick_ms);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => self.advance(tick_ms),
                }
            }
            info!("Virtual sink clock stopped");
        })
    }

    /// Recorded calls, oldest first
    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Entry ids in playlist order
    pub fn playlist_ids(&self) -> Vec<EntryId> {
        self.lock().playlist.iter().map(|e| e.id().clone()).collect()
    }

    /// Current transport state
    pub fn state(&self) -> TransportState {
        let state = self.lock();
        TransportState {
            playing: state.playing,
            buffering: state.buffering,
            position_ms: state.position_ms,
            duration_ms: state.duration_ms,
            current_index: state.current,
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.lock().repeat
    }
}

impl Default for VirtualSink {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_MS)
    }
}

impl PlaybackSink for VirtualSink {
    fn append(&self, entry: &QueueEntry) -> Result<()> {
        self.apply(Some(SinkCall::Append(entry.id().clone())), |state| {
            state.playlist.push(entry.clone());
            Ok(())
        })
    }

    fn insert_at(&self, position: usize, entry: &QueueEntry) -> Result<()> {
        self.apply(Some(SinkCall::InsertAt(position, entry.id().clone())), |state| {
            if position > state.playlist.len() {
                return Err(Error::Sink(format!(
                    "insert position {} beyond playlist len {}",
                    position,
                    state.playlist.len()
                )));
            }
            state.playlist.insert(position, entry.clone());
            if let Some(c) = state.current {
                if position <= c {
                    state.current = Some(c + 1);
                }
            }
            Ok(())
        })
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.apply(Some(SinkCall::RemoveAt(index)), |state| {
            state.check_index(index)?;
            state.playlist.remove(index);
            let len = state.playlist.len();

            match state.current {
                Some(c) if index < c => state.current = Some(c - 1),
                Some(c) if index == c => {
                    if len == 0 {
                        state.release();
                        state.set_playing(false);
                        state.set_buffering(BufferingState::Idle);
                    } else {
                        state.begin(c.min(len - 1));
                    }
                }
                _ => {}
            }
            Ok(())
        })
    }

    fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.apply(Some(SinkCall::Move(from, to)), |state| {
            state.check_index(from)?;
            state.check_index(to)?;
            let entry = state.playlist.remove(from);
            state.playlist.insert(to, entry);

            if let Some(c) = state.current {
                state.current = Some(if c == from {
                    to
                } else if from < c && c <= to {
                    c - 1
                } else if to <= c && c < from {
                    c + 1
                } else {
                    c
                });
            }
            Ok(())
        })
    }

    fn pause(&self) -> Result<()> {
        self.apply(Some(SinkCall::Pause), |state| {
            state.set_playing(false);
            Ok(())
        })
    }

    fn clear_all(&self) -> Result<()> {
        self.apply(Some(SinkCall::ClearAll), |state| {
            state.playlist.clear();
            state.release();
            Ok(())
        })
    }

    fn stop(&self) -> Result<()> {
        self.apply(Some(SinkCall::Stop), |state| {
            state.set_playing(false);
            state.set_buffering(BufferingState::Idle);
            state.set_position(0);
            Ok(())
        })
    }

    fn prepare_and_play(&self) -> Result<()> {
        self.apply(Some(SinkCall::PrepareAndPlay), |state| {
            if state.playlist.is_empty() {
                debug!("Virtual sink asked to play an empty playlist");
                return Ok(());
            }
            match state.current {
                None => state.begin(0),
                Some(c) if state.buffering == BufferingState::Ended => state.begin(c),
                Some(_) => {}
            }
            if state.buffering != BufferingState::Ready {
                state.set_buffering(BufferingState::Buffering);
                state.set_buffering(BufferingState::Ready);
            }
            state.set_playing(true);
            Ok(())
        })
    }

    fn seek(&self, position_ms: u64) -> Result<()> {
        self.apply(Some(SinkCall::Seek(position_ms)), |state| {
            if state.current.is_none() {
                return Err(Error::Sink("nothing to seek in".to_string()));
            }
            let target = position_ms.min(state.duration_ms);
            state.set_position(target);
            Ok(())
        })
    }

    fn seek_to_index(&self, index: usize) -> Result<()> {
        self.apply(Some(SinkCall::SeekToIndex(index)), |state| {
            state.check_index(index)?;
            state.begin(index);
            if state.buffering == BufferingState::Ended {
                state.set_buffering(BufferingState::Ready);
            }
            Ok(())
        })
    }

    fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.apply(Some(SinkCall::SetRepeatMode(mode)), |state| {
            state.repeat = mode;
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportUpdate> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::{StreamHandle, Track};

    fn entry(id: &str, duration_ms: u64) -> QueueEntry {
        QueueEntry::with_id(
            id.into(),
            "test",
            Track::new(id, id).with_duration_ms(duration_ms),
            StreamHandle {
                id: id.to_string(),
                uri: format!("mem://{}", id),
                mime_type: None,
            },
        )
    }

    fn drain(rx: &mut broadcast::Receiver<TransportUpdate>) -> Vec<TransportUpdate> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn loaded(ids: &[&str]) -> VirtualSink {
        let sink = VirtualSink::default();
        for id in ids {
            sink.append(&entry(id, 1_000)).unwrap();
        }
        sink
    }

    #[test]
    fn test_prepare_and_play_starts_first_entry() {
        let sink = loaded(&["a", "b"]);
        let mut rx = sink.subscribe();
        sink.prepare_and_play().unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                TransportUpdate::CurrentIndex { index: Some(0), entry_id: Some("a".into()) },
                TransportUpdate::Duration { duration_ms: 1_000 },
                TransportUpdate::Buffering { state: BufferingState::Buffering },
                TransportUpdate::Buffering { state: BufferingState::Ready },
                TransportUpdate::Playing { playing: true },
            ]
        );

        // Second call changes nothing observable
        sink.prepare_and_play().unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_clock_advances_monotonically_then_moves_on() {
        let sink = loaded(&["a", "b"]);
        sink.prepare_and_play().unwrap();
        let mut rx = sink.subscribe();

        sink.advance(400);
        sink.advance(400);
        sink.advance(400);

        assert_eq!(
            drain(&mut rx),
            vec![
                TransportUpdate::Position { position_ms: 400 },
                TransportUpdate::Position { position_ms: 800 },
                TransportUpdate::Position { position_ms: 1_000 },
                TransportUpdate::CurrentIndex { index: Some(1), entry_id: Some("b".into()) },
                TransportUpdate::Position { position_ms: 0 },
            ]
        );
    }

    #[test]
    fn test_repeat_off_ends_after_last_entry() {
        let sink = loaded(&["a"]);
        sink.prepare_and_play().unwrap();
        sink.advance(1_500);

        let state = sink.state();
        assert!(!state.playing);
        assert_eq!(state.buffering, BufferingState::Ended);
        assert_eq!(state.position_ms, 1_000);
        assert_eq!(state.current_index, Some(0));
    }

    #[test]
    fn test_repeat_all_wraps_and_repeat_one_restarts() {
        let sink = loaded(&["a", "b"]);
        assert_eq!(sink.repeat_mode(), RepeatMode::Off);
        sink.set_repeat_mode(RepeatMode::All).unwrap();
        assert_eq!(sink.repeat_mode(), RepeatMode::All);
        sink.seek_to_index(1).unwrap();
        sink.prepare_and_play().unwrap();
        sink.advance(1_000);
        assert_eq!(sink.state().current_index, Some(0));

        sink.set_repeat_mode(RepeatMode::One).unwrap();
        let mut rx = sink.subscribe();
        sink.advance(1_000);
        assert_eq!(sink.state().current_index, Some(0));
        // Same entry again: no CurrentIndex update
        assert!(!drain(&mut rx)
            .iter()
            .any(|u| matches!(u, TransportUpdate::CurrentIndex { .. })));
    }

    #[test]
    fn test_remove_current_starts_next_entry() {
        let sink = loaded(&["a", "b", "c"]);
        sink.seek_to_index(1).unwrap();
        let mut rx = sink.subscribe();

        sink.remove_at(1).unwrap();
        let expected: Vec<EntryId> = vec!["a".into(), "c".into()];
        assert_eq!(sink.playlist_ids(), expected);
        assert_eq!(
            drain(&mut rx)[0],
            TransportUpdate::CurrentIndex { index: Some(1), entry_id: Some("c".into()) }
        );

        // Removing before the current entry only shifts the index
        sink.remove_at(0).unwrap();
        assert_eq!(sink.state().current_index, Some(0));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_move_follows_current_entry() {
        let sink = loaded(&["a", "b", "c"]);
        sink.seek_to_index(0).unwrap();
        sink.move_item(0, 2).unwrap();
        let expected: Vec<EntryId> = vec!["b".into(), "c".into(), "a".into()];
        assert_eq!(sink.playlist_ids(), expected);
        assert_eq!(sink.state().current_index, Some(2));

        sink.move_item(1, 0).unwrap();
        assert_eq!(sink.state().current_index, Some(2));
        assert!(sink.move_item(0, 3).is_err());
    }

    #[test]
    fn test_clear_and_stop_reset_transport() {
        let sink = loaded(&["a", "b"]);
        sink.prepare_and_play().unwrap();
        sink.advance(300);
        let mut rx = sink.subscribe();

        sink.pause().unwrap();
        sink.clear_all().unwrap();
        sink.stop().unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                TransportUpdate::Playing { playing: false },
                TransportUpdate::CurrentIndex { index: None, entry_id: None },
                TransportUpdate::Duration { duration_ms: 0 },
                TransportUpdate::Position { position_ms: 0 },
                TransportUpdate::Buffering { state: BufferingState::Idle },
            ]
        );
        assert_eq!(
            sink.calls()[sink.calls().len() - 3..],
            [SinkCall::Pause, SinkCall::ClearAll, SinkCall::Stop]
        );
    }

    #[test]
    fn test_bounds_are_errors() {
        let sink = loaded(&["a"]);
        assert!(matches!(sink.seek_to_index(1), Err(Error::Sink(_))));
        assert!(matches!(sink.insert_at(3, &entry("x", 10)), Err(Error::Sink(_))));
        assert!(matches!(sink.seek(10), Err(Error::Sink(_))));
    }

    #[tokio::test]
    async fn test_clock_task_advances_position() {
        let sink = Arc::new(loaded(&["a"]));
        sink.prepare_and_play().unwrap();
        let shutdown = CancellationToken::new();
        let handle = Arc::clone(&sink).spawn_clock(Duration::from_millis(5), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(sink.state().position_ms > 0);
    }
}
