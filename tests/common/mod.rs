//! Integration test common infrastructure.
//!
//! Starts in-process servers on ephemeral ports and provides a realtime
//! WebSocket client for asserting on event flows.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
