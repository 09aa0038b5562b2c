//! Shared fixtures for cadence-player integration tests
//!
//! - MemoryExtension: in-process search/stream extension with gated queries
//! - wait_until: poll a condition with a deadline

#![allow(dead_code)]

pub mod memory_extension;

pub use memory_extension::MemoryExtension;

use std::time::Duration;

/// Poll `condition` every few milliseconds until it holds or `limit` elapses
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
