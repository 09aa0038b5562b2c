//! Error types for cadence-player
//!
//! Resolution-layer failures (no extension, missing capability, empty result,
//! unplayable track, backend failure) never mutate the queue. Index-layer
//! failures are surfaced to the caller as-is; explicit indices are never
//! clamped.

use std::fmt;
use thiserror::Error;

/// Capability an extension may or may not provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Search,
    Stream,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Search => write!(f, "search"),
            Capability::Stream => write!(f, "stream"),
        }
    }
}

/// Main error type for cadence-player
#[derive(Error, Debug)]
pub enum Error {
    /// No extension is bound to the session
    #[error("No extension bound")]
    NoResolverBound,

    /// The bound extension lacks a required capability
    #[error("Extension does not support {capability}")]
    CapabilityMissing { capability: Capability },

    /// A search settled without any track
    #[error("Could not find anything for '{query}'")]
    EmptyResult { query: String },

    /// The extension declined to provide a stream for a track
    #[error("Track {track} is unplayable: {reason}")]
    Unplayable { track: String, reason: String },

    /// Explicit index outside the queue bounds
    #[error("Index {index} out of bounds (len {bound})")]
    IndexError { index: usize, bound: usize },

    /// An entry with the same id is already queued
    #[error("Entry {id} is already queued")]
    DuplicateEntry { id: String },

    /// No queued entry has this id
    #[error("Entry {id} is not queued")]
    UnknownEntry { id: String },

    /// A newer request for the same slot replaced this one
    #[error("Request for '{query}' was superseded by a newer one")]
    Superseded { query: String },

    /// Search backend failure (network, page error, timeout)
    #[error("Search failed: {0}")]
    Search(String),

    /// No extension registered under the requested id
    #[error("Unknown extension: {0}")]
    UnknownExtension(String),

    /// Playback sink rejected a call
    #[error("Sink error: {0}")]
    Sink(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] cadence_common::Error),
}

/// Convenience Result type using cadence-player Error
pub type Result<T> = std::result::Result<T, Error>;
