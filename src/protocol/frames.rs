//! Wire frames exchanged over the messaging channel
//!
//! Every frame is a flat UTF-8 JSON object carrying a `type` discriminator,
//! for example:
//!
//! ```text
//! { "type": "message", "id": "...", "content": "...", "timestamp": 1699999999999, "userId": "...", "sessionId": "..." }
//! { "type": "ping", "timestamp": 1699999999999 }
//! { "type": "typing", "userId": "...", "isTyping": true, "timestamp": 1699999999999 }
//! ```

use super::messages::{generate_message_id, now_millis, Message, MessageStatus, MessageType};
use serde::{Deserialize, Serialize};

/// Frame types this client understands, by wire name
pub const KNOWN_FRAME_TYPES: [&str; 6] = ["message", "system", "typing", "ping", "pong", "status"];

/// A decoded wire frame, keyed by its `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Message(ChatFrame),
    System(SystemFrame),
    Typing(TypingFrame),
    Ping(PingFrame),
    Pong(PingFrame),
    Status(StatusFrame),
}

impl Frame {
    pub fn kind(&self) -> MessageType {
        match self {
            Frame::Message(_) => MessageType::Message,
            Frame::System(_) => MessageType::System,
            Frame::Typing(_) => MessageType::Typing,
            Frame::Ping(_) => MessageType::Ping,
            Frame::Pong(_) => MessageType::Pong,
            Frame::Status(_) => MessageType::Status,
        }
    }

    /// Keep-alive frame stamped with the current time
    pub fn ping() -> Self {
        Frame::Ping(PingFrame {
            timestamp: Some(now_millis()),
        })
    }

    pub fn chat(message: &Message) -> Self {
        Frame::Message(ChatFrame::from(message))
    }

    pub fn typing(user_id: &str, session_id: &str, is_typing: bool) -> Self {
        Frame::Typing(TypingFrame {
            user_id: user_id.to_string(),
            username: None,
            session_id: Some(session_id.to_string()),
            is_typing,
            timestamp: Some(now_millis()),
        })
    }

    /// Serialize into the JSON text sent on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Chat message frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFrame {
    #[serde(default = "generate_message_id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "now_millis")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl From<&Message> for ChatFrame {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            user_id: message.user_id.clone(),
            session_id: message.session_id.clone(),
            username: message.username.clone(),
        }
    }
}

impl ChatFrame {
    /// Convert an inbound chat frame into a history entry
    pub fn into_received(self) -> Message {
        Message {
            id: self.id,
            kind: MessageType::Message,
            content: self.content,
            timestamp: self.timestamp,
            user_id: self.user_id,
            session_id: self.session_id,
            username: self.username,
            status: MessageStatus::Received,
        }
    }
}

/// Server-originated notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Typing indicator for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingFrame {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Body shared by `ping` and `pong`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Out-of-band connection status pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub status: String,
}
