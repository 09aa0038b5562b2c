//! Playback queue
//!
//! The [`QueueStore`] owns the ordered entries and the current index.
//! Everything else observes it through snapshots and event subscriptions.

pub mod store;

pub use store::{QueueSnapshot, QueueStore, QueueSubscription};
