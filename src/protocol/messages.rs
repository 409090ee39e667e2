//! Conversation data model
//!
//! This module defines the messages a session keeps in its history, their
//! delivery status, and the connection state reported to callers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Kind of a conversation entry or wire frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Message,
    System,
    Typing,
    Ping,
    Pong,
    Status,
}

impl MessageType {
    /// Wire name used in the `type` discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Message => "message",
            MessageType::System => "system",
            MessageType::Typing => "typing",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Status => "status",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a message
///
/// Locally created messages move `Sending -> Sent` or `Sending -> Failed`,
/// and `Failed -> Sent` once a retry succeeds. Inbound messages are `Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Received,
    Failed,
}

/// A single entry of the conversation history
///
/// # Examples
/// ```
/// use rds_messaging::protocol::{Message, MessageStatus, MessageType};
///
/// let message = Message::outgoing("hello", "alice", "session-1");
/// assert_eq!(message.kind, MessageType::Message);
/// assert_eq!(message.status, MessageStatus::Sending);
/// assert!(message.id.starts_with("rds_"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier assigned at creation, never reassigned
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    /// Creation instant on the sender's clock, epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Display name supplied by the server for inbound messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub status: MessageStatus,
}

impl Message {
    /// Create a locally originated chat message in the `Sending` state
    pub fn outgoing(content: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            id: generate_message_id(),
            kind: MessageType::Message,
            content: content.to_string(),
            timestamp: now_millis(),
            user_id: Some(user_id.to_string()),
            session_id: Some(session_id.to_string()),
            username: None,
            status: MessageStatus::Sending,
        }
    }

    /// Create a system notice, filling in id and timestamp when the server omitted them
    pub fn system(id: Option<String>, content: String, timestamp: Option<i64>) -> Self {
        Self {
            id: id.unwrap_or_else(generate_message_id),
            kind: MessageType::System,
            content,
            timestamp: timestamp.unwrap_or_else(now_millis),
            user_id: None,
            session_id: None,
            username: None,
            status: MessageStatus::Received,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(
            self.status,
            MessageStatus::Sending | MessageStatus::Sent | MessageStatus::Failed
        )
    }
}

/// Generate a message id from the current time and a random suffix
pub fn generate_message_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("rds_{}_{}", now_millis(), &random[..9])
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Authoritative connection status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Reconnection attempts exhausted; only a manual connect leaves this state
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown connection state: {0}")]
pub struct UnknownConnectionState(pub String);

impl FromStr for ConnectionState {
    type Err = UnknownConnectionState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disconnected" => Ok(ConnectionState::Disconnected),
            "connecting" => Ok(ConnectionState::Connecting),
            "connected" => Ok(ConnectionState::Connected),
            "failed" => Ok(ConnectionState::Failed),
            _ => Err(UnknownConnectionState(s.to_string())),
        }
    }
}
