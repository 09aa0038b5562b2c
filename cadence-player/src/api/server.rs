//! HTTP server setup and routing
//!
//! Sets up the Axum router for queue, playback and extension endpoints and
//! the SSE stream.

use crate::error::{Error, Result};
use crate::session::SessionCoordinator;
use axum::{
    routing::{delete, get, post},
    Router,
};
use cadence_common::events::TransportState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::{handlers, sse};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub session: Arc<SessionCoordinator>,
    /// Folded transport state published by the transport monitor
    pub transport: watch::Receiver<TransportState>,
    /// Ends open SSE streams on shutdown
    pub shutdown: CancellationToken,
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))
        // Queue
        .route("/queue", get(handlers::get_queue))
        .route("/queue/search", post(handlers::add_by_query))
        .route("/queue/tracks", post(handlers::add_tracks))
        .route("/queue/move", post(handlers::move_queue_items))
        .route("/queue/clear", post(handlers::clear_queue))
        .route("/queue/:index", delete(handlers::remove_queue_item))
        // Playback control
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/seek", post(handlers::seek))
        .route("/playback/seek_to_index", post(handlers::seek_to_index))
        .route("/playback/next", post(handlers::next))
        .route("/playback/previous", post(handlers::previous))
        .route("/playback/repeat", post(handlers::set_repeat_mode))
        .route("/playback/state", get(handlers::get_playback_state))
        // Extensions
        .route("/extensions", get(handlers::list_extensions))
        .route("/extensions/bind", post(handlers::bind_extension))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run HTTP API server until `ctx.shutdown` is cancelled
pub async fn run(port: u16, ctx: AppContext) -> Result<()> {
    let shutdown = ctx.shutdown.clone();
    let app = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
