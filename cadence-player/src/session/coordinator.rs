//! Session Coordinator
//!
//! **Responsibilities:**
//! - Hold the bound extension and check its capabilities per operation
//! - Resolve outside the store lock, then apply finished entries in one
//!   short mutation
//! - Discard late results of superseded searches (generation tokens)
//! - Forward transport commands to the sink synchronizer

use crate::backend::{Extension, ExtensionRegistry, SearchProvider, StreamResolver};
use crate::error::{Capability, Error, Result};
use crate::queue::QueueStore;
use crate::resolver::{self, ResolutionFailure, ResolvedBatch};
use crate::sink::TransportControls;
use cadence_common::config::SessionConfig;
use cadence_common::events::{CadenceEvent, EventBus, RepeatMode, TransportCommand};
use cadence_common::{QueueEntry, Track};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Result of an add request
#[derive(Debug, Default)]
pub struct AddOutcome {
    /// Inserted entries with their insertion positions, in queue order
    pub inserted: Vec<(usize, QueueEntry)>,
    /// Tracks skipped because they could not be resolved
    pub failures: Vec<ResolutionFailure>,
}

impl AddOutcome {
    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.inserted.iter().map(|(_, entry)| entry)
    }

    /// Position of the first inserted entry
    pub fn first_position(&self) -> Option<usize> {
        self.inserted.first().map(|(position, _)| *position)
    }

    fn new(
        positions: Vec<usize>,
        entries: Vec<QueueEntry>,
        failures: Vec<ResolutionFailure>,
    ) -> Self {
        Self {
            inserted: positions.into_iter().zip(entries).collect(),
            failures,
        }
    }
}

/// Coordinates queue mutation requests
pub struct SessionCoordinator {
    store: Arc<QueueStore>,
    registry: ExtensionRegistry,
    extension: RwLock<Option<Arc<dyn Extension>>>,
    search_generation: AtomicU64,
    controls: TransportControls,
    bus: Arc<EventBus>,
    config: SessionConfig,
}

impl SessionCoordinator {
    /// Create new coordinator with no extension bound
    pub fn new(
        store: Arc<QueueStore>,
        registry: ExtensionRegistry,
        controls: TransportControls,
        bus: Arc<EventBus>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            registry,
            extension: RwLock::new(None),
            search_generation: AtomicU64::new(0),
            controls,
            bus,
            config,
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.config.search_timeout_ms)
    }

    // ========================================================================
    // Extension binding
    // ========================================================================

    /// Bind `extension` (None = unbind)
    ///
    /// Resolutions already in flight keep the extension they started with.
    pub async fn bind_extension(&self, extension: Option<Arc<dyn Extension>>) {
        let extension_id = extension.as_ref().map(|e| e.id().to_string());
        *self.extension.write().await = extension;

        match &extension_id {
            Some(id) => info!("Bound extension '{}'", id),
            None => info!("Unbound extension"),
        }
        self.bus.emit_lossy(CadenceEvent::ExtensionChanged {
            extension_id,
            timestamp: Utc::now(),
        });
    }

    /// Bind a registered extension by id
    pub async fn bind_by_id(&self, id: &str) -> Result<()> {
        let extension = self.registry.get(id)?;
        self.bind_extension(Some(extension)).await;
        Ok(())
    }

    /// Bind the configured default extension, or the first registered one
    pub async fn bind_default(&self) -> Result<Option<String>> {
        let extension = match &self.config.default_extension {
            Some(id) => Some(self.registry.get(id)?),
            None => self.registry.first(),
        };
        let id = extension.as_ref().map(|e| e.id().to_string());
        if extension.is_some() {
            self.bind_extension(extension).await;
        } else {
            warn!("No extension registered; resolver operations will fail");
        }
        Ok(id)
    }

    pub async fn extension_id(&self) -> Option<String> {
        self.extension
            .read()
            .await
            .as_ref()
            .map(|e| e.id().to_string())
    }

    async fn bound(&self) -> Result<Arc<dyn Extension>> {
        self.extension
            .read()
            .await
            .clone()
            .ok_or(Error::NoResolverBound)
    }

    // ========================================================================
    // Queue mutations
    // ========================================================================

    /// Search, resolve and queue the first settled page of results
    ///
    /// A later `add_by_query` supersedes this one: if it starts before this
    /// one has inserted, this one fails with [`Error::Superseded`] and leaves
    /// the queue untouched.
    pub async fn add_by_query(&self, query: &str) -> Result<AddOutcome> {
        let extension = self.bound_for(query).await?;
        let provider: &dyn SearchProvider = self.require(
            query,
            extension.search_provider(),
            Capability::Search,
        )?;
        let stream_resolver: &dyn StreamResolver = self.require(
            query,
            extension.stream_resolver(),
            Capability::Stream,
        )?;

        // Bumped only once the request is able to run
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let is_current = || self.search_generation.load(Ordering::SeqCst) == generation;

        debug!("Search '{}' started (generation {})", query, generation);
        let tracks = match resolver::search_tracks(provider, query, self.search_timeout()).await {
            Ok(tracks) => tracks,
            Err(e) => {
                self.report_failure(query, &e);
                return Err(e);
            }
        };

        if !is_current() {
            return Err(self.superseded(query, generation));
        }

        let batch = resolver::resolve_all(
            extension.id(),
            stream_resolver,
            tracks,
            self.config.resolve_concurrency,
        )
        .await;

        match self
            .store
            .insert_all_if(batch.entries.clone(), 0, is_current)?
        {
            Some(positions) => {
                self.report_batch_failures(&batch);
                info!(
                    "Queued {} entries for '{}' ({} failed)",
                    positions.len(),
                    query,
                    batch.failures.len()
                );
                Ok(AddOutcome::new(positions, batch.entries, batch.failures))
            }
            None => Err(self.superseded(query, generation)),
        }
    }

    /// Resolve and queue `tracks` at the default position
    pub async fn add_tracks(&self, tracks: Vec<Track>) -> Result<AddOutcome> {
        let batch = self.resolve_tracks(tracks).await?;
        let positions = self.store.insert_all(batch.entries.clone(), 0)?;
        self.report_batch_failures(&batch);
        info!(
            "Queued {} tracks ({} failed)",
            positions.len(),
            batch.failures.len()
        );
        Ok(AddOutcome::new(positions, batch.entries, batch.failures))
    }

    /// Queue `tracks` and start playing the first of them
    pub async fn play_tracks(&self, tracks: Vec<Track>) -> Result<AddOutcome> {
        let outcome = self.add_tracks(tracks).await?;
        if let Some(first) = outcome.first_position() {
            self.controls.send(TransportCommand::SeekToIndex { index: first })?;
            self.controls.send(TransportCommand::Play)?;
        }
        Ok(outcome)
    }

    /// Replace the whole queue with `tracks` and play from the start
    ///
    /// Nothing is cleared unless at least one track resolved.
    pub async fn replace_queue(&self, tracks: Vec<Track>) -> Result<AddOutcome> {
        let batch = self.resolve_tracks(tracks).await?;
        self.report_batch_failures(&batch);
        if batch.entries.is_empty() {
            warn!("Queue not replaced: no track could be resolved");
            return Ok(AddOutcome::new(Vec::new(), Vec::new(), batch.failures));
        }

        self.clear_queue().await;
        let positions = self.store.insert_all(batch.entries.clone(), 0)?;
        if let Some(first) = positions.first() {
            self.controls.send(TransportCommand::SeekToIndex { index: *first })?;
            self.controls.send(TransportCommand::Play)?;
        }
        info!("Replaced queue with {} entries", positions.len());
        Ok(AddOutcome::new(positions, batch.entries, batch.failures))
    }

    pub fn remove_queue_item(&self, index: usize) -> Result<QueueEntry> {
        self.store.remove_at(index)
    }

    pub fn move_queue_items(&self, from: usize, to: usize) -> Result<()> {
        self.store.move_item(from, to)
    }

    /// Stop the transport, then empty the queue
    pub async fn clear_queue(&self) {
        if let Err(e) = self.controls.send_and_wait(TransportCommand::Stop).await {
            warn!("Clearing queue without stopping playback first: {}", e);
        }
        self.store.clear();
        info!("Queue cleared");
    }

    async fn resolve_tracks(&self, tracks: Vec<Track>) -> Result<ResolvedBatch> {
        let subject = tracks
            .iter()
            .map(Track::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let extension = self.bound_for(&subject).await?;
        let stream_resolver =
            self.require(&subject, extension.stream_resolver(), Capability::Stream)?;

        Ok(resolver::resolve_all(
            extension.id(),
            stream_resolver,
            tracks,
            self.config.resolve_concurrency,
        )
        .await)
    }

    /// Bound extension, publishing the failure when there is none
    async fn bound_for(&self, subject: &str) -> Result<Arc<dyn Extension>> {
        self.bound().await.map_err(|e| self.reported(subject, e))
    }

    fn require<'a, T: ?Sized>(
        &self,
        subject: &str,
        provided: Option<&'a T>,
        capability: Capability,
    ) -> Result<&'a T> {
        provided.ok_or_else(|| self.reported(subject, Error::CapabilityMissing { capability }))
    }

    fn superseded(&self, query: &str, generation: u64) -> Error {
        debug!(
            "Discarding results of '{}' (generation {} is stale)",
            query, generation
        );
        Error::Superseded {
            query: query.to_string(),
        }
    }

    fn report_batch_failures(&self, batch: &ResolvedBatch) {
        for failure in &batch.failures {
            self.report_failure(&failure.track.to_string(), &failure.error);
        }
    }

    fn reported(&self, subject: &str, error: Error) -> Error {
        self.report_failure(subject, &error);
        error
    }

    fn report_failure(&self, subject: &str, error: &Error) {
        self.bus.emit_lossy(CadenceEvent::ResolutionFailed {
            subject: subject.to_string(),
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    // ========================================================================
    // Transport passthroughs
    // ========================================================================

    pub fn play(&self) -> Result<()> {
        self.controls.send(TransportCommand::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.controls.send(TransportCommand::Pause)
    }

    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.controls.send(TransportCommand::Seek { position_ms })
    }

    /// Jump to a queue position, validated against the queue right now
    pub fn seek_to_index(&self, index: usize) -> Result<()> {
        self.store.check_index(index)?;
        self.controls.send(TransportCommand::SeekToIndex { index })
    }

    /// Jump `offset` entries from the current one (+1 next, -1 previous)
    pub fn seek_relative(&self, offset: i64) -> Result<()> {
        self.controls.send(TransportCommand::SeekRelative { offset })
    }

    pub fn next(&self) -> Result<()> {
        self.seek_relative(1)
    }

    pub fn previous(&self) -> Result<()> {
        self.seek_relative(-1)
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.controls.send(TransportCommand::SetRepeatMode { mode })
    }
}
