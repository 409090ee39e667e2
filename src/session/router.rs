//! Pure classification of inbound frames
//!
//! Every text frame is decoded and mapped to an [`InboundRoute`] describing
//! what the session should do with it. Nothing here touches session state,
//! so a bad frame can only ever produce an error value for the caller to
//! report before moving on to the next frame.

use super::typing::TypingUser;
use crate::protocol::{ConnectionState, Frame, Message, KNOWN_FRAME_TYPES};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not JSON at all
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// JSON with a known `type` but a body that does not fit it
    #[error("Invalid {kind} frame: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What the session does with an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundRoute {
    /// `pong`: the peer is alive, nothing else to do
    Liveness,
    /// Chat message for history and the message hook
    Chat(Message),
    /// Server notice, stored as a system message
    System(Message),
    Typing { user: TypingUser, is_typing: bool },
    /// Server-pushed connection state
    Status(ConnectionState),
    /// Frame understood but deliberately dropped
    Ignored(String),
}

/// Routes inbound frames
pub struct InboundRouter;

impl InboundRouter {
    /// Classify one raw text frame (pure function)
    pub fn route(raw: &str) -> Result<InboundRoute, FrameError> {
        let value: Value = serde_json::from_str(raw).map_err(FrameError::Malformed)?;

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Ok(InboundRoute::Ignored("frame without type".to_string())),
        };
        if !KNOWN_FRAME_TYPES.contains(&kind.as_str()) {
            return Ok(InboundRoute::Ignored(format!("unknown frame type '{kind}'")));
        }

        let frame: Frame = serde_json::from_value(value)
            .map_err(|source| FrameError::Invalid { kind, source })?;
        Ok(Self::route_frame(frame))
    }

    /// Map a decoded frame to its route (pure function)
    pub fn route_frame(frame: Frame) -> InboundRoute {
        match frame {
            Frame::Pong(_) => InboundRoute::Liveness,
            Frame::Ping(_) => InboundRoute::Ignored("inbound ping".to_string()),
            Frame::Message(chat) => InboundRoute::Chat(chat.into_received()),
            Frame::System(system) => InboundRoute::System(Message::system(
                system.id,
                system.content,
                system.timestamp,
            )),
            Frame::Typing(typing) => InboundRoute::Typing {
                user: TypingUser::new(typing.user_id, typing.username),
                is_typing: typing.is_typing,
            },
            Frame::Status(status) => match status.status.parse::<ConnectionState>() {
                Ok(state) => InboundRoute::Status(state),
                Err(e) => {
                    debug!("Ignoring status frame: {}", e);
                    InboundRoute::Ignored(e.to_string())
                }
            },
        }
    }
}
