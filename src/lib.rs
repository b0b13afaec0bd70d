//! fblite - server core of a small social backend.
//!
//! Runs an HTTP listener with a health surface, a realtime (WebSocket)
//! listener for chat rooms, and a supervised backing store connection, all
//! sequenced by the [`lifecycle`] controller.

pub mod config;
pub mod error;
pub mod fatal;
pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod realtime;
pub mod security;
pub mod store;
pub mod supervisor;
pub mod telemetry;

pub use lifecycle::{RunningServer, Server};
