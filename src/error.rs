//! Error types for the messaging client
//!
//! Public methods return [`ClientError`] or [`SendError`]. Failures that
//! happen inside the session (socket errors, undecodable frames, exhausted
//! retries) are never returned; they are reported to subscribers as
//! [`SessionError`] values.

use crate::config::ConfigError;
use crate::transport::TransportError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Longest error detail kept in a [`SessionError`]
const MAX_DETAIL_LEN: usize = 500;

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Session has shut down")]
    SessionClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Why `send_message` did not produce a delivered or queued message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Message content is empty")]
    EmptyContent,

    #[error("Pending queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },

    #[error("Session has shut down")]
    SessionClosed,
}

/// Category of an error reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Socket construction, handshake or runtime failure
    Transport,
    /// A message could not be written and went to the pending queue
    SendFailure,
    /// An inbound frame could not be decoded
    Parse,
    /// Reconnection gave up; only a manual connect recovers
    ExhaustedRetries,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::SendFailure => "send_failure",
            ErrorKind::Parse => "parse",
            ErrorKind::ExhaustedRetries => "exhausted_retries",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced through the `on_error` hook and the event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: truncate_detail(detail.into()),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, detail)
    }

    pub fn send_failure(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SendFailure, detail)
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, detail)
    }

    pub fn exhausted_retries(attempts: u32) -> Self {
        Self::new(
            ErrorKind::ExhaustedRetries,
            format!("Gave up reconnecting after {attempts} attempts"),
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for SessionError {}

/// Cap detail length; frames echoed into parse errors can be arbitrarily large
fn truncate_detail(mut detail: String) -> String {
    if detail.len() <= MAX_DETAIL_LEN {
        return detail;
    }
    let suffix = "...[truncated]";
    let mut cut = MAX_DETAIL_LEN - suffix.len();
    while !detail.is_char_boundary(cut) {
        cut -= 1;
    }
    detail.truncate(cut);
    detail.push_str(suffix);
    detail
}
