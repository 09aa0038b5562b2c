//! Local catalog extension
//!
//! Serves search and stream resolution from a TOML catalog file:
//!
//! ```toml
//! [[tracks]]
//! id = "t1"
//! title = "Blue in Green"
//! artists = ["Miles Davis"]
//! album = "Kind of Blue"
//! duration_ms = 337000
//! stream_uri = "file:///music/blue-in-green.flac"
//! mime_type = "audio/flac"
//! ```
//!
//! Tracks without `stream_uri` are searchable but unplayable.

use super::{Extension, SearchPage, SearchProvider, StreamResolver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cadence_common::{MediaItem, MediaItemsContainer, StreamHandle, Track};
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Extension id used when none is configured
pub const DEFAULT_CATALOG_ID: &str = "local";

const DEFAULT_PAGE_SIZE: usize = 20;

/// One `[[tracks]]` row of a catalog file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub stream_uri: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl CatalogTrack {
    fn to_track(&self) -> Track {
        Track {
            id: self.id.clone(),
            title: self.title.clone(),
            artists: self.artists.clone(),
            album: self.album.clone(),
            duration_ms: self.duration_ms,
            extras: self.extras.clone(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .artists
                .iter()
                .any(|a| a.to_lowercase().contains(needle))
            || self
                .album
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tracks: Vec<CatalogTrack>,
}

/// Extension backed by an in-memory track catalog
pub struct CatalogExtension {
    id: String,
    tracks: Arc<Vec<CatalogTrack>>,
    page_size: usize,
}

impl CatalogExtension {
    /// Create new catalog extension from already loaded tracks
    ///
    /// Fails if two tracks share an id.
    pub fn new(id: impl Into<String>, tracks: Vec<CatalogTrack>) -> Result<Self> {
        let mut seen = HashSet::new();
        for track in &tracks {
            if !seen.insert(track.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate catalog track id '{}'",
                    track.id
                )));
            }
        }
        Ok(Self {
            id: id.into(),
            tracks: Arc::new(tracks),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Parse a catalog from TOML text
    pub fn from_toml_str(id: impl Into<String>, content: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(cadence_common::Error::from)?;
        Self::new(id, file.tracks)
    }

    /// Load a catalog file from disk
    pub fn load(id: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(id, &content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(
            "Loaded catalog '{}' with {} tracks from {}",
            catalog.id,
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Results per search page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Group a page of matches: all tracks in one category, then one item per album
fn page_containers(chunk: &[CatalogTrack]) -> Vec<MediaItemsContainer> {
    let mut containers = vec![MediaItemsContainer::Category {
        title: "Tracks".to_string(),
        items: chunk
            .iter()
            .map(|t| MediaItem::Track(t.to_track()))
            .collect(),
    }];

    let mut albums = HashSet::new();
    for album in chunk.iter().filter_map(|t| t.album.as_deref()) {
        if albums.insert(album) {
            containers.push(MediaItemsContainer::Item {
                item: MediaItem::Album {
                    id: album.to_lowercase().replace(' ', "-"),
                    title: album.to_string(),
                },
            });
        }
    }
    containers
}

impl SearchProvider for CatalogExtension {
    fn search(&self, query: &str) -> BoxStream<'static, SearchPage> {
        let tracks = Arc::clone(&self.tracks);
        let page_size = self.page_size;
        let needle = query.trim().to_lowercase();

        async_stream::stream! {
            yield SearchPage::Loading;

            let matches: Vec<CatalogTrack> = tracks
                .iter()
                .filter(|t| t.matches(&needle))
                .cloned()
                .collect();
            debug!("Catalog search '{}' matched {} tracks", needle, matches.len());

            if matches.is_empty() {
                yield SearchPage::Ready(Vec::new());
                return;
            }
            for chunk in matches.chunks(page_size) {
                yield SearchPage::Loading;
                yield SearchPage::Ready(page_containers(chunk));
            }
        }
        .boxed()
    }
}

#[async_trait]
impl StreamResolver for CatalogExtension {
    async fn resolve_stream(&self, track: &Track) -> Result<StreamHandle> {
        let entry = self
            .tracks
            .iter()
            .find(|t| t.id == track.id)
            .ok_or_else(|| Error::Unplayable {
                track: track.to_string(),
                reason: format!("not in catalog '{}'", self.id),
            })?;

        let uri = entry.stream_uri.clone().ok_or_else(|| Error::Unplayable {
            track: track.to_string(),
            reason: "no stream available".to_string(),
        })?;

        Ok(StreamHandle {
            id: entry.id.clone(),
            uri,
            mime_type: entry.mime_type.clone(),
        })
    }
}

impl Extension for CatalogExtension {
    fn id(&self) -> &str {
        &self.id
    }

    fn search_provider(&self) -> Option<&dyn SearchProvider> {
        Some(self)
    }

    fn stream_resolver(&self) -> Option<&dyn StreamResolver> {
        Some(self)
    }
}
