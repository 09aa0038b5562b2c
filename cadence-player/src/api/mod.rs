//! HTTP control surface
//!
//! REST endpoints for queue and transport control plus an SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
