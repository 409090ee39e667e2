//! Transport layer for the messaging channel
//!
//! This module provides the socket abstraction a session drives. A
//! [`Connector`] opens one [`Transport`] per connection attempt; the transport
//! reports what happens on the socket through an [`EventSink`] as
//! [`TransportEvent`]s, which the session consumes in arrival order.

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod handshake;
pub mod websocket;

pub use handshake::{build_handshake_target, is_clean_close, CLOSE_ABNORMAL, CLOSE_NORMAL};
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// Identifies one transport instance within a session
pub type ConnectionId = u64;

/// Raw socket events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed, frames may be sent
    Open,
    /// A text frame arrived
    Message(String),
    /// Socket-level failure; a `Closed` event follows when the socket goes down
    Error(String),
    /// The socket is gone
    Closed { code: u16, reason: String },
}

/// Socket readiness, mirroring the browser socket `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    /// Open or still handshaking
    pub fn is_live(&self) -> bool {
        matches!(self, ReadyState::Connecting | ReadyState::Open)
    }
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport construction failed: {0}")]
    Construction(String),
    #[error("Invalid handshake target: {0}")]
    InvalidTarget(String),
    #[error("Transport is not open")]
    NotOpen,
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Frame encoding failed")]
    Encode(#[source] serde_json::Error),
    #[error("Transport closed")]
    Closed,
}

/// Channel a transport reports its events through, tagged with its connection id
#[derive(Debug, Clone)]
pub struct EventSink {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
}

impl EventSink {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Deliver an event; returns false once the session is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.id, event)).is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    pub fn error(&self, detail: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(detail.into()))
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }
}

/// A single bidirectional socket connection
///
/// Implementations must not block: `send` hands the frame off and `close`
/// only initiates the closing handshake. Dropping a transport that is still
/// live closes it.
pub trait Transport: Send {
    /// Send one text frame; fails unless the transport is open
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Start closing the socket with the given close code
    fn close(&mut self, code: u16, reason: &str);

    fn ready_state(&self) -> ReadyState;

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// Factory for transports
///
/// `open` returns as soon as the transport object exists; the handshake
/// completes in the background and is reported as [`TransportEvent::Open`]
/// or as an `Error`/`Closed` pair.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, target: &Url, events: EventSink) -> Result<Box<dyn Transport>, TransportError>;
}

/// Encode a frame and send it through the transport
pub fn send_frame(
    transport: &mut dyn Transport,
    frame: &crate::protocol::Frame,
) -> Result<(), TransportError> {
    let text = frame.encode().map_err(TransportError::Encode)?;
    transport.send(&text)
}
