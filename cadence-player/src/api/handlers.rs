//! HTTP request handlers
//!
//! Queue and transport endpoints. Every handler is a thin adapter over the
//! [`SessionCoordinator`](crate::session::SessionCoordinator); failures are
//! mapped to status codes by [`error_response`].

use crate::api::server::AppContext;
use crate::error::Error;
use crate::queue::QueueSnapshot;
use crate::session::AddOutcome;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cadence_common::events::{RepeatMode, TransportState};
use cadence_common::{QueueEntry, Track};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueResponse {
    pub entries: Vec<QueueEntry>,
    pub current_index: Option<usize>,
}

impl From<&QueueSnapshot> for QueueResponse {
    fn from(snapshot: &QueueSnapshot) -> Self {
        Self {
            entries: snapshot.to_vec(),
            current_index: snapshot.current_index(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

/// What to do with tracks posted to `/queue/tracks`
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddMode {
    /// Insert after the current entry
    #[default]
    Queue,
    /// Insert after the current entry and start playing the first one
    Play,
    /// Replace the whole queue and play from the start
    Replace,
}

#[derive(Debug, Deserialize)]
pub struct TracksRequest {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub mode: AddMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InsertedEntry {
    pub position: usize,
    pub entry: QueueEntry,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailedTrack {
    pub track_id: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddResponse {
    pub inserted: Vec<InsertedEntry>,
    pub failures: Vec<FailedTrack>,
}

impl From<AddOutcome> for AddResponse {
    fn from(outcome: AddOutcome) -> Self {
        Self {
            inserted: outcome
                .inserted
                .into_iter()
                .map(|(position, entry)| InsertedEntry { position, entry })
                .collect(),
            failures: outcome
                .failures
                .into_iter()
                .map(|f| FailedTrack {
                    track_id: f.track.id,
                    title: f.track.title,
                    reason: f.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct SeekIndexRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct RepeatRequest {
    pub mode: RepeatMode,
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    /// Extension to bind; absent or null unbinds
    pub extension_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtensionsResponse {
    pub extensions: Vec<String>,
    pub bound: Option<String>,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<T, ApiError>;

/// Map a player error to an HTTP status and body
pub fn error_response(e: Error) -> ApiError {
    let status = match &e {
        Error::IndexError { .. } => StatusCode::BAD_REQUEST,
        Error::DuplicateEntry { .. } | Error::Superseded { .. } => StatusCode::CONFLICT,
        Error::NoResolverBound => StatusCode::PRECONDITION_FAILED,
        Error::CapabilityMissing { .. } | Error::Unplayable { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::EmptyResult { .. } | Error::UnknownExtension(_) | Error::UnknownEntry { .. } => {
            StatusCode::NOT_FOUND
        }
        Error::Search(_) => StatusCode::BAD_GATEWAY,
        Error::Sink(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Http(_) | Error::Config(_) | Error::Io(_) | Error::Common(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warn!("Request failed ({}): {}", status, e);
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "cadence-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /queue - Current queue snapshot
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    Json(QueueResponse::from(&ctx.session.store().snapshot()))
}

/// POST /queue/search - Search and queue the first settled page
pub async fn add_by_query(
    State(ctx): State<AppContext>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<AddResponse>> {
    info!("Add by query request: '{}'", req.query);
    let outcome = ctx
        .session
        .add_by_query(&req.query)
        .await
        .map_err(error_response)?;
    Ok(Json(outcome.into()))
}

/// POST /queue/tracks - Resolve and queue (or play, or replace with) tracks
pub async fn add_tracks(
    State(ctx): State<AppContext>,
    Json(req): Json<TracksRequest>,
) -> ApiResult<Json<AddResponse>> {
    info!("Add tracks request: {} tracks ({:?})", req.tracks.len(), req.mode);
    let outcome = match req.mode {
        AddMode::Queue => ctx.session.add_tracks(req.tracks).await,
        AddMode::Play => ctx.session.play_tracks(req.tracks).await,
        AddMode::Replace => ctx.session.replace_queue(req.tracks).await,
    }
    .map_err(error_response)?;
    Ok(Json(outcome.into()))
}

/// DELETE /queue/:index - Remove one entry
pub async fn remove_queue_item(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> ApiResult<Json<QueueEntry>> {
    info!("Remove queue item request: {}", index);
    let removed = ctx
        .session
        .remove_queue_item(index)
        .map_err(error_response)?;
    Ok(Json(removed))
}

/// POST /queue/move - Swap two entries
pub async fn move_queue_items(
    State(ctx): State<AppContext>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<StatusCode> {
    info!("Move queue items request: {} <-> {}", req.from, req.to);
    ctx.session
        .move_queue_items(req.from, req.to)
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /queue/clear - Stop playback and empty the queue
pub async fn clear_queue(State(ctx): State<AppContext>) -> StatusCode {
    info!("Clear queue request");
    ctx.session.clear_queue().await;
    StatusCode::NO_CONTENT
}

// ============================================================================
// Playback Endpoints
// ============================================================================

fn accepted(result: crate::error::Result<()>) -> ApiResult<StatusCode> {
    result.map(|_| StatusCode::ACCEPTED).map_err(error_response)
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> ApiResult<StatusCode> {
    accepted(ctx.session.play())
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<StatusCode> {
    accepted(ctx.session.pause())
}

/// POST /playback/seek - Seek within the current entry
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<StatusCode> {
    accepted(ctx.session.seek(req.position_ms))
}

/// POST /playback/seek_to_index - Jump to a queue position
pub async fn seek_to_index(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekIndexRequest>,
) -> ApiResult<StatusCode> {
    accepted(ctx.session.seek_to_index(req.index))
}

/// POST /playback/next
pub async fn next(State(ctx): State<AppContext>) -> ApiResult<StatusCode> {
    accepted(ctx.session.next())
}

/// POST /playback/previous
pub async fn previous(State(ctx): State<AppContext>) -> ApiResult<StatusCode> {
    accepted(ctx.session.previous())
}

/// POST /playback/repeat - Set repeat mode (off, one, all)
pub async fn set_repeat_mode(
    State(ctx): State<AppContext>,
    Json(req): Json<RepeatRequest>,
) -> ApiResult<StatusCode> {
    accepted(ctx.session.set_repeat_mode(req.mode))
}

/// GET /playback/state - Last transport state reported by the sink
pub async fn get_playback_state(State(ctx): State<AppContext>) -> Json<TransportState> {
    let state = *ctx.transport.borrow();
    Json(state)
}

// ============================================================================
// Extension Endpoints
// ============================================================================

/// GET /extensions - Registered extensions and the bound one
pub async fn list_extensions(State(ctx): State<AppContext>) -> Json<ExtensionsResponse> {
    Json(ExtensionsResponse {
        extensions: ctx.session.registry().ids(),
        bound: ctx.session.extension_id().await,
    })
}

/// POST /extensions/bind - Bind an extension by id (null unbinds)
pub async fn bind_extension(
    State(ctx): State<AppContext>,
    Json(req): Json<BindRequest>,
) -> ApiResult<Json<ExtensionsResponse>> {
    match &req.extension_id {
        Some(id) => ctx.session.bind_by_id(id).await.map_err(error_response)?,
        None => ctx.session.bind_extension(None).await,
    }
    Ok(list_extensions(State(ctx)).await)
}
