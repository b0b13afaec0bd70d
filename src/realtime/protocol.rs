//! Realtime wire format.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use crate::error::EventError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Longest accepted room id.
pub const MAX_ROOM_ID_LEN: usize = 128;

/// Outbound event names.
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const ERROR: &str = "error";
    pub const USER_TYPING: &str = "user_typing";
    pub const USER_STOPPED_TYPING: &str = "user_stopped_typing";
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat(String),
    LeaveChat(String),
    Typing(TypingPayload),
    StopTyping(StopTypingPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingPayload {
    pub chat_id: String,
    pub user_id: String,
}

impl ClientEvent {
    /// Decode and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let event: ClientEvent = serde_json::from_str(text)?;
        check_room_id(event.room_id())?;
        Ok(event)
    }

    /// The room this event targets.
    pub fn room_id(&self) -> &str {
        match self {
            Self::JoinChat(room) | Self::LeaveChat(room) => room,
            Self::Typing(p) => &p.chat_id,
            Self::StopTyping(p) => &p.chat_id,
        }
    }

    /// Wire name, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat(_) => "join_chat",
            Self::LeaveChat(_) => "leave_chat",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop_typing",
        }
    }
}

fn check_room_id(room: &str) -> Result<(), EventError> {
    if room.is_empty() || room.len() > MAX_ROOM_ID_LEN {
        return Err(EventError::InvalidRoom {
            max: MAX_ROOM_ID_LEN,
        });
    }
    Ok(())
}

/// A frame sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub event: String,
    pub data: Value,
}

impl OutboundFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn connected(connection_id: &str) -> Self {
        Self::new(events::CONNECTED, json!({ "connectionId": connection_id }))
    }

    pub fn error(err: &EventError) -> Self {
        Self::new(
            events::ERROR,
            json!({ "code": err.error_code(), "message": err.to_string() }),
        )
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_and_leave() {
        assert_eq!(
            ClientEvent::parse(r#"{"event":"join_chat","data":"chat-1"}"#).unwrap(),
            ClientEvent::JoinChat("chat-1".into())
        );
        assert_eq!(
            ClientEvent::parse(r#"{"event":"leave_chat","data":"chat-1"}"#).unwrap(),
            ClientEvent::LeaveChat("chat-1".into())
        );
    }

    #[test]
    fn parses_typing_with_camel_case_fields() {
        let event = ClientEvent::parse(
            r#"{"event":"typing","data":{"chatId":"c","userId":"u1","userName":"Ana"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Typing(TypingPayload {
                chat_id: "c".into(),
                user_id: "u1".into(),
                user_name: "Ana".into(),
            })
        );
        assert_eq!(event.room_id(), "c");
    }

    #[test]
    fn rejects_unknown_event_and_missing_fields() {
        assert!(matches!(
            ClientEvent::parse(r#"{"event":"shout","data":"x"}"#),
            Err(EventError::Malformed(_))
        ));
        assert!(matches!(
            ClientEvent::parse(r#"{"event":"stop_typing","data":{"chatId":"c"}}"#),
            Err(EventError::Malformed(_))
        ));
        assert!(ClientEvent::parse("not json").is_err());
    }

    #[test]
    fn rejects_bad_room_ids() {
        assert!(matches!(
            ClientEvent::parse(r#"{"event":"join_chat","data":""}"#),
            Err(EventError::InvalidRoom { .. })
        ));
        let long = "r".repeat(MAX_ROOM_ID_LEN + 1);
        let frame = format!(r#"{{"event":"join_chat","data":"{long}"}}"#);
        assert!(matches!(
            ClientEvent::parse(&frame),
            Err(EventError::InvalidRoom { .. })
        ));
    }

    #[test]
    fn outbound_frame_shape() {
        let frame = OutboundFrame::new(events::USER_TYPING, json!({"chatId": "c"}));
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "user_typing", "data": {"chatId": "c"}}));
    }
}
