//! Realtime messaging over WebSocket.
//!
//! Clients join chat rooms and exchange typing indicators. The gateway
//! accepts sockets, each connection task decodes frames and dispatches them,
//! and the room registry fans frames out to room members.

pub mod connection;
pub mod gateway;
pub mod handlers;
pub mod protocol;
pub mod rooms;

pub use connection::{Connection, ConnectionLimits};
pub use gateway::{Gateway, origin_allowed};
pub use handlers::dispatch;
pub use protocol::{ClientEvent, OutboundFrame, StopTypingPayload, TypingPayload};
pub use rooms::{ConnectionId, FrameSink, RoomRegistry};
