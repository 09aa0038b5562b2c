//! Server-Sent Events (SSE) stream
//!
//! Each client first receives a `QueueSnapshot`, then every queue event in
//! commit order, interleaved with [`CadenceEvent`]s from the event bus.
//! The snapshot and the queue subscription are taken atomically, so a client
//! replaying queue events onto the snapshot stays in step with the store.

use crate::api::handlers::QueueResponse;
use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use cadence_common::events::CadenceEvent;
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

fn json_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize {}: {}", name, e);
            None
        }
    }
}

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let (snapshot, mut queue_events) = ctx.session.store().subscribe_with_snapshot();
    let mut bus_events = ctx.session.bus().subscribe();
    let shutdown = ctx.shutdown.clone();

    let stream = async_stream::stream! {
        if let Some(event) = json_event("QueueSnapshot", &QueueResponse::from(&snapshot)) {
            yield Ok(event);
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                event = queue_events.recv() => match event {
                    Some(event) => {
                        debug!("SSE: Queue event {}", event.name());
                        if let Some(sse) = json_event(event.name(), &event) {
                            yield Ok(sse);
                        }
                    }
                    None => break,
                },

                event = bus_events.recv() => match event {
                    Ok(event) => {
                        let name = CadenceEvent::name(&event);
                        if let Some(sse) = json_event(name, &event) {
                            yield Ok(sse);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE: Client lagged, {} bus events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("SSE: Event stream ended");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
