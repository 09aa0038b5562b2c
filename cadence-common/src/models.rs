//! Track, search result and queue entry models
//!
//! Extensions hand out [`Track`]s wrapped in [`MediaItem`]s and
//! [`MediaItemsContainer`]s. A track becomes playable once a stream resolver
//! produces a [`StreamHandle`] for it; the pair is then frozen into a
//! [`QueueEntry`] that never changes for as long as it sits in the queue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A track as described by an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Extension-scoped track identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// Artist names, in credit order
    #[serde(default)]
    pub artists: Vec<String>,

    /// Album title, if the track belongs to one
    #[serde(default)]
    pub album: Option<String>,

    /// Track length in milliseconds, when the extension knows it
    #[serde(default)]
    pub duration_ms: Option<u64>,

    /// Extension-specific key/value data carried through untouched
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl Track {
    /// Create a track with only an id and a title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artists: Vec::new(),
            album: None,
            duration_ms: None,
            extras: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach artists
    pub fn with_artists<I, S>(mut self, artists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artists = artists.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper to attach an album title
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Builder-style helper to attach a duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artists.is_empty() {
            write!(f, "{} [{}]", self.title, self.id)
        } else {
            write!(f, "{} - {} [{}]", self.artists.join(", "), self.title, self.id)
        }
    }
}

/// One item in a search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaItem {
    Track(Track),
    Album { id: String, title: String },
    Artist { id: String, name: String },
    Playlist { id: String, title: String },
}

impl MediaItem {
    /// The wrapped track, if this item is one
    pub fn as_track(&self) -> Option<&Track> {
        match self {
            MediaItem::Track(track) => Some(track),
            _ => None,
        }
    }
}

/// A group of search results as laid out by an extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaItemsContainer {
    /// Titled shelf of items
    Category { title: String, items: Vec<MediaItem> },

    /// A single standalone item
    Item { item: MediaItem },
}

impl MediaItemsContainer {
    /// Iterate the tracks held by this container, skipping every other kind of item
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        let items: &[MediaItem] = match self {
            MediaItemsContainer::Category { items, .. } => items,
            MediaItemsContainer::Item { item } => std::slice::from_ref(item),
        };
        items.iter().filter_map(MediaItem::as_track)
    }
}

/// Opaque handle to a resolved stream
///
/// `id` identifies the stream within its extension and is what queue entry
/// identity is derived from. `uri` is only meaningful to the playback sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHandle {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Stable identifier of a queue entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Derive an entry id from the resolved stream identity
    ///
    /// A random nonce is appended so the same stream queued twice still gets
    /// two distinct ids.
    pub fn derive(extension_id: &str, stream: &StreamHandle) -> Self {
        Self(format!(
            "{}:{}:{}",
            extension_id,
            stream.id,
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resolved, playable unit in the queue
///
/// Immutable once created; reordering only changes where it sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    id: EntryId,
    extension_id: String,
    track: Track,
    stream: StreamHandle,
}

impl QueueEntry {
    /// Build an entry for a track resolved by `extension_id`
    pub fn new(extension_id: impl Into<String>, track: Track, stream: StreamHandle) -> Self {
        let extension_id = extension_id.into();
        let id = EntryId::derive(&extension_id, &stream);
        Self::with_id(id, extension_id, track, stream)
    }

    /// Build an entry with an explicit id
    pub fn with_id(
        id: EntryId,
        extension_id: impl Into<String>,
        track: Track,
        stream: StreamHandle,
    ) -> Self {
        Self {
            id,
            extension_id: extension_id.into(),
            track,
            stream,
        }
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    /// Extension that resolved this entry
    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: &str) -> StreamHandle {
        StreamHandle {
            id: id.to_string(),
            uri: format!("file:///music/{}.flac", id),
            mime_type: None,
        }
    }

    #[test]
    fn test_entry_ids_are_unique_for_same_stream() {
        let track = Track::new("t1", "First");
        let a = QueueEntry::new("local", track.clone(), stream("s1"));
        let b = QueueEntry::new("local", track, stream("s1"));

        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("local:s1:"));
    }

    #[test]
    fn test_container_tracks_skip_non_track_items() {
        let container = MediaItemsContainer::Category {
            title: "Results".to_string(),
            items: vec![
                MediaItem::Track(Track::new("t1", "One")),
                MediaItem::Album {
                    id: "a1".to_string(),
                    title: "Album".to_string(),
                },
                MediaItem::Track(Track::new("t2", "Two")),
            ],
        };

        let ids: Vec<&str> = container.tracks().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let single = MediaItemsContainer::Item {
            item: MediaItem::Artist {
                id: "ar1".to_string(),
                name: "Someone".to_string(),
            },
        };
        assert_eq!(single.tracks().count(), 0);
    }

    #[test]
    fn test_track_display() {
        let track = Track::new("t9", "Song").with_artists(["A", "B"]);
        assert_eq!(track.to_string(), "A, B - Song [t9]");
        assert_eq!(Track::new("t1", "Solo").to_string(), "Solo [t1]");
    }

    #[test]
    fn test_media_item_serialization_is_tagged() {
        let item = MediaItem::Track(Track::new("t1", "One"));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "track");
        assert_eq!(json["id"], "t1");
    }
}
