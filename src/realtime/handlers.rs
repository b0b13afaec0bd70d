//! Realtime event handlers.

use super::protocol::{ClientEvent, events};
use super::rooms::RoomRegistry;
use crate::metrics;
use serde_json::json;
use tracing::debug;

/// Apply one client event on behalf of `conn`.
///
/// Typing indicators are relayed to the rest of the room; the sender never
/// receives its own echo.
pub fn dispatch(rooms: &RoomRegistry, conn: &str, event: ClientEvent) {
    metrics::record_realtime_event(event.name());
    match event {
        ClientEvent::JoinChat(room) => {
            if rooms.join(conn, &room) {
                debug!(room = %room, "Joined chat");
            }
        }
        ClientEvent::LeaveChat(room) => {
            if rooms.leave(conn, &room) {
                debug!(room = %room, "Left chat");
            }
        }
        ClientEvent::Typing(payload) => {
            let room = payload.chat_id.clone();
            rooms.broadcast_to_room(&room, events::USER_TYPING, json!(payload), Some(conn));
        }
        ClientEvent::StopTyping(payload) => {
            let room = payload.chat_id.clone();
            rooms.broadcast_to_room(
                &room,
                events::USER_STOPPED_TYPING,
                json!(payload),
                Some(conn),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::protocol::{OutboundFrame, StopTypingPayload, TypingPayload};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn connect(rooms: &RoomRegistry, conn: &str) -> mpsc::Receiver<Arc<OutboundFrame>> {
        let (tx, rx) = mpsc::channel(8);
        rooms.register(conn, tx);
        rx
    }

    #[test]
    fn typing_reaches_other_members_only() {
        let rooms = RoomRegistry::new();
        let mut alice = connect(&rooms, "alice");
        let mut bob = connect(&rooms, "bob");
        dispatch(&rooms, "alice", ClientEvent::JoinChat("chat-9".into()));
        dispatch(&rooms, "bob", ClientEvent::JoinChat("chat-9".into()));

        dispatch(
            &rooms,
            "alice",
            ClientEvent::Typing(TypingPayload {
                chat_id: "chat-9".into(),
                user_id: "u-alice".into(),
                user_name: "Alice".into(),
            }),
        );

        let frame = bob.try_recv().unwrap();
        assert_eq!(frame.event, events::USER_TYPING);
        assert_eq!(
            frame.data,
            json!({"chatId": "chat-9", "userId": "u-alice", "userName": "Alice"})
        );
        assert!(alice.try_recv().is_err());
    }

    #[test]
    fn stop_typing_is_relayed_as_user_stopped_typing() {
        let rooms = RoomRegistry::new();
        let _alice = connect(&rooms, "alice");
        let mut bob = connect(&rooms, "bob");
        rooms.join("alice", "chat-9");
        rooms.join("bob", "chat-9");

        dispatch(
            &rooms,
            "alice",
            ClientEvent::StopTyping(StopTypingPayload {
                chat_id: "chat-9".into(),
                user_id: "u-alice".into(),
            }),
        );
        let frame = bob.try_recv().unwrap();
        assert_eq!(frame.event, events::USER_STOPPED_TYPING);
        assert_eq!(frame.data, json!({"chatId": "chat-9", "userId": "u-alice"}));
    }

    #[test]
    fn leave_stops_delivery() {
        let rooms = RoomRegistry::new();
        let _alice = connect(&rooms, "alice");
        let mut bob = connect(&rooms, "bob");
        rooms.join("alice", "chat-9");
        rooms.join("bob", "chat-9");
        dispatch(&rooms, "bob", ClientEvent::LeaveChat("chat-9".into()));

        dispatch(
            &rooms,
            "alice",
            ClientEvent::StopTyping(StopTypingPayload {
                chat_id: "chat-9".into(),
                user_id: "u-alice".into(),
            }),
        );
        assert!(bob.try_recv().is_err());
    }
}
