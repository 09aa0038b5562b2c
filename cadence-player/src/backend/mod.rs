//! Extension backends
//!
//! An extension is an external component that can search for tracks and/or
//! resolve a track to a playable stream. The session binds to exactly one
//! extension at a time and checks its capabilities before every operation.

pub mod catalog;

use crate::error::{Error, Result};
use async_trait::async_trait;
use cadence_common::{MediaItemsContainer, StreamHandle, Track};
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use catalog::CatalogExtension;

/// Load state of one search result page
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPage {
    /// Page still loading
    Loading,
    /// Page settled with results
    Ready(Vec<MediaItemsContainer>),
    /// Page settled with an error
    Failed(String),
}

/// Search capability
pub trait SearchProvider: Send + Sync {
    /// Lazily produce result pages for `query`
    ///
    /// Consumers poll only as far as they need; nothing is fetched for pages
    /// that are never polled.
    fn search(&self, query: &str) -> BoxStream<'static, SearchPage>;
}

/// Stream resolution capability
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve `track` to a stream handle
    ///
    /// Fails with [`Error::Unplayable`] when the backend declines the track.
    async fn resolve_stream(&self, track: &Track) -> Result<StreamHandle>;
}

/// A bound-able backend
pub trait Extension: Send + Sync {
    /// Stable extension identifier
    fn id(&self) -> &str;

    fn search_provider(&self) -> Option<&dyn SearchProvider> {
        None
    }

    fn stream_resolver(&self) -> Option<&dyn StreamResolver> {
        None
    }
}

/// Extensions available for binding, keyed by id
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extensions: BTreeMap<String, Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension, replacing any previous one with the same id
    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        self.extensions
            .insert(extension.id().to_string(), extension);
    }

    /// Look up an extension by id
    pub fn get(&self, id: &str) -> Result<Arc<dyn Extension>> {
        self.extensions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownExtension(id.to_string()))
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }

    /// First extension by id order, if any
    pub fn first(&self) -> Option<Arc<dyn Extension>> {
        self.extensions.values().next().cloned()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
