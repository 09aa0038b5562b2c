//! # Cadence Player
//!
//! Playback-queue coordination service: one authoritative queue shared by
//! a playback sink, UI observers and asynchronous track producers.
//!
//! **Components (leaf first):**
//! - [`resolver`]: turns queries and tracks into playable queue entries
//! - [`queue`]: the queue store, ordered lossless events, snapshots
//! - [`session`]: request coordination, extension binding, stale discard
//! - [`sink`]: mirrors queue events and transport commands onto the sink
//! - [`api`]: HTTP and SSE control surface

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod player;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod sink;

pub use error::{Error, Result};
pub use player::Player;
pub use queue::{QueueSnapshot, QueueStore, QueueSubscription};
pub use session::{AddOutcome, SessionCoordinator};
