//! Track Resolution Adapter
//!
//! Turns search queries and tracks into playable queue entries by calling the
//! bound extension's [`SearchProvider`] and [`StreamResolver`]. Holds no shared
//! state and never retries; retry policy belongs to the caller.

use crate::backend::{SearchPage, SearchProvider, StreamResolver};
use crate::error::{Error, Result};
use cadence_common::{MediaItemsContainer, QueueEntry, Track};
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tracing::{debug, warn};

/// A track that could not be resolved, with the reason
#[derive(Debug)]
pub struct ResolutionFailure {
    pub track: Track,
    pub error: Error,
}

/// Outcome of resolving a batch of tracks
#[derive(Debug, Default)]
pub struct ResolvedBatch {
    /// Entries in the same order as the input tracks
    pub entries: Vec<QueueEntry>,
    pub failures: Vec<ResolutionFailure>,
}

/// Resolve one track into a queue entry
///
/// Any backend failure is reported as [`Error::Unplayable`].
pub async fn resolve(
    extension_id: &str,
    resolver: &dyn StreamResolver,
    track: Track,
) -> Result<QueueEntry> {
    match resolver.resolve_stream(&track).await {
        Ok(stream) => {
            debug!("Resolved {} to stream {}", track, stream.id);
            Ok(QueueEntry::new(extension_id, track, stream))
        }
        Err(err @ Error::Unplayable { .. }) => Err(err),
        Err(other) => Err(Error::Unplayable {
            track: track.to_string(),
            reason: other.to_string(),
        }),
    }
}

/// Resolve a batch, up to `concurrency` tracks at a time
///
/// Failed tracks are skipped and reported; the rest keep their input order.
pub async fn resolve_all(
    extension_id: &str,
    resolver: &dyn StreamResolver,
    tracks: Vec<Track>,
    concurrency: usize,
) -> ResolvedBatch {
    let results: Vec<(Track, Result<QueueEntry>)> = stream::iter(tracks)
        .map(|track| async move {
            let result = resolve(extension_id, resolver, track.clone()).await;
            (track, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut batch = ResolvedBatch::default();
    for (track, result) in results {
        match result {
            Ok(entry) => batch.entries.push(entry),
            Err(error) => {
                warn!("Skipping unplayable track {}: {}", track, error);
                batch.failures.push(ResolutionFailure { track, error });
            }
        }
    }
    batch
}

/// Wait for the first settled page of a lazy search
///
/// `Loading` pages are skipped. A stream that ends before settling yields no
/// results; a `Failed` page or the timeout is a search error.
pub async fn first_settled_page(
    mut pages: BoxStream<'static, SearchPage>,
    timeout: Duration,
) -> Result<Vec<MediaItemsContainer>> {
    let wait = async {
        while let Some(page) = pages.next().await {
            match page {
                SearchPage::Loading => continue,
                SearchPage::Ready(containers) => return Ok(containers),
                SearchPage::Failed(reason) => return Err(Error::Search(reason)),
            }
        }
        Ok(Vec::new())
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| Error::Search(format!("timed out after {} ms", timeout.as_millis())))?
}

/// All tracks in the containers, in order, skipping non-track items
pub fn extract_tracks(containers: &[MediaItemsContainer]) -> Vec<Track> {
    containers
        .iter()
        .flat_map(|container| container.tracks())
        .cloned()
        .collect()
}

/// Search and return the tracks of the first settled page
///
/// Fails with [`Error::EmptyResult`] when that page holds no track.
pub async fn search_tracks(
    provider: &dyn SearchProvider,
    query: &str,
    timeout: Duration,
) -> Result<Vec<Track>> {
    let containers = first_settled_page(provider.search(query), timeout).await?;
    let tracks = extract_tracks(&containers);
    debug!(
        "Search '{}' settled with {} containers, {} tracks",
        query,
        containers.len(),
        tracks.len()
    );

    if tracks.is_empty() {
        return Err(Error::EmptyResult {
            query: query.to_string(),
        });
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cadence_common::{MediaItem, StreamHandle};

    /// Resolves every track except those whose id starts with "bad"
    struct PickyResolver;

    #[async_trait]
    impl StreamResolver for PickyResolver {
        async fn resolve_stream(&self, track: &Track) -> Result<StreamHandle> {
            if track.id.starts_with("bad") {
                return Err(Error::Search("connection reset".to_string()));
            }
            Ok(StreamHandle {
                id: format!("s-{}", track.id),
                uri: format!("mem://{}", track.id),
                mime_type: None,
            })
        }
    }

    struct FixedSearch(Vec<SearchPage>);

    impl SearchProvider for FixedSearch {
        fn search(&self, _query: &str) -> BoxStream<'static, SearchPage> {
            stream::iter(self.0.clone()).boxed()
        }
    }

    fn track_item(id: &str) -> MediaItem {
        MediaItem::Track(Track::new(id, id))
    }

    #[tokio::test]
    async fn test_resolve_wraps_backend_errors_as_unplayable() {
        let entry = resolve("ext", &PickyResolver, Track::new("ok1", "Fine"))
            .await
            .unwrap();
        assert_eq!(entry.stream().id, "s-ok1");
        assert_eq!(entry.extension_id(), "ext");

        let err = resolve("ext", &PickyResolver, Track::new("bad1", "Broken"))
            .await
            .unwrap_err();
        match err {
            Error::Unplayable { track, reason } => {
                assert!(track.contains("bad1"));
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected Unplayable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_all_reports_partial_failures_in_order() {
        let tracks = vec![
            Track::new("t1", "One"),
            Track::new("bad2", "Two"),
            Track::new("t3", "Three"),
            Track::new("bad4", "Four"),
            Track::new("t5", "Five"),
        ];

        let batch = resolve_all("ext", &PickyResolver, tracks, 2).await;
        let ids: Vec<&str> = batch.entries.iter().map(|e| e.track().id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3", "t5"]);

        let failed: Vec<&str> = batch.failures.iter().map(|f| f.track.id.as_str()).collect();
        assert_eq!(failed, vec!["bad2", "bad4"]);
    }

    #[tokio::test]
    async fn test_first_settled_page_skips_loading() {
        let pages = stream::iter(vec![
            SearchPage::Loading,
            SearchPage::Loading,
            SearchPage::Ready(vec![MediaItemsContainer::Item { item: track_item("t1") }]),
            SearchPage::Ready(vec![MediaItemsContainer::Item { item: track_item("t2") }]),
        ])
        .boxed();

        let containers = first_settled_page(pages, Duration::from_secs(1)).await.unwrap();
        assert_eq!(extract_tracks(&containers)[0].id, "t1");
        assert_eq!(containers.len(), 1);
    }

    #[tokio::test]
    async fn test_first_settled_page_failure() {
        let pages = stream::iter(vec![SearchPage::Loading, SearchPage::Failed("503".to_string())]).boxed();
        let err = first_settled_page(pages, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::Search(reason) if reason == "503"));
    }

    #[tokio::test]
    async fn test_first_settled_page_times_out() {
        let pages = stream::pending::<SearchPage>().boxed();
        let err = first_settled_page(pages, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::Search(reason) if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_search_tracks_skips_non_tracks_and_reports_empty() {
        let provider = FixedSearch(vec![SearchPage::Ready(vec![
            MediaItemsContainer::Category {
                title: "Top".to_string(),
                items: vec![
                    MediaItem::Artist { id: "a".to_string(), name: "A".to_string() },
                    track_item("t1"),
                ],
            },
            MediaItemsContainer::Item {
                item: MediaItem::Playlist { id: "p".to_string(), title: "P".to_string() },
            },
            MediaItemsContainer::Item { item: track_item("t2") },
        ])]);

        let tracks = search_tracks(&provider, "q", Duration::from_secs(1)).await.unwrap();
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let only_albums = FixedSearch(vec![SearchPage::Ready(vec![MediaItemsContainer::Item {
            item: MediaItem::Album { id: "al".to_string(), title: "Al".to_string() },
        }])]);
        let err = search_tracks(&only_albums, "nothing", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResult { query } if query == "nothing"));

        // Stream ending without a settled page is an empty result too
        let silent = FixedSearch(vec![SearchPage::Loading]);
        let err = search_tracks(&silent, "silent", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResult { .. }));
    }
}
