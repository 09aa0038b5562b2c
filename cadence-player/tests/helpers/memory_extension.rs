//! In-memory extension for driving the session without a catalog file
//!
//! Search results for a query `q` are the tracks `q1`, `q2` and `q3`.
//! Queries starting with `empty` settle with no results. A query can be
//! gated: its search announces that it has started, then holds its page
//! until released.
//!
//! Stream resolution fails for every track whose id starts with `x`.

use async_stream::stream;
use async_trait::async_trait;
use cadence_common::{MediaItem, MediaItemsContainer, StreamHandle, Track};
use cadence_player::backend::{Extension, SearchPage, SearchProvider, StreamResolver};
use cadence_player::{Error, Result};
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Clone)]
struct Gate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

pub struct MemoryExtension {
    id: String,
    gates: Mutex<HashMap<String, Gate>>,
}

impl MemoryExtension {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Gate `query`; returns (started, release) notifiers
    pub fn gate(&self, query: &str) -> (Arc<Notify>, Arc<Notify>) {
        let gate = Gate {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let handles = (gate.started.clone(), gate.release.clone());
        self.gates.lock().unwrap().insert(query.to_string(), gate);
        handles
    }

    pub fn tracks_for(query: &str) -> Vec<Track> {
        (1..=3)
            .map(|n| {
                Track::new(format!("{}{}", query, n), format!("{} #{}", query, n))
                    .with_artists(["Memory Band"])
            })
            .collect()
    }
}

impl SearchProvider for MemoryExtension {
    fn search(&self, query: &str) -> BoxStream<'static, SearchPage> {
        let query = query.to_string();
        let gate = self.gates.lock().unwrap().get(&query).cloned();

        stream! {
            yield SearchPage::Loading;
            if let Some(gate) = gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
            if query.starts_with("empty") {
                yield SearchPage::Ready(Vec::new());
            } else {
                let items = MemoryExtension::tracks_for(&query)
                    .into_iter()
                    .map(MediaItem::Track)
                    .collect();
                yield SearchPage::Ready(vec![MediaItemsContainer::Category {
                    title: "Tracks".to_string(),
                    items,
                }]);
            }
        }
        .boxed()
    }
}

#[async_trait]
impl StreamResolver for MemoryExtension {
    async fn resolve_stream(&self, track: &Track) -> Result<StreamHandle> {
        if track.id.starts_with('x') {
            return Err(Error::Unplayable {
                track: track.to_string(),
                reason: "no stream available".to_string(),
            });
        }
        Ok(StreamHandle {
            id: format!("s-{}", track.id),
            uri: format!("mem://{}", track.id),
            mime_type: Some("audio/flac".to_string()),
        })
    }
}

impl Extension for MemoryExtension {
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
