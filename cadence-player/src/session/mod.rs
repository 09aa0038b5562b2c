//! Session coordination
//!
//! The [`SessionCoordinator`] owns the bound extension and is the entry
//! point for every queue mutation and transport request.

pub mod coordinator;

pub use coordinator::{AddOutcome, SessionCoordinator};
