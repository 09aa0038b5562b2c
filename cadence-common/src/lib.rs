//! # Cadence Common Library
//!
//! Shared code for the cadence playback-queue services including:
//! - Track, search result and queue entry models
//! - Event types (queue events, transport commands/updates, bus events)
//! - EventBus for one-to-many event broadcasting
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{EntryId, MediaItem, MediaItemsContainer, QueueEntry, StreamHandle, Track};
