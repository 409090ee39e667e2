//! WebSocket transport over tokio-tungstenite
//!
//! Each [`WebSocketTransport`] owns a background socket task. The task runs
//! the handshake, forwards inbound text frames to the session's
//! [`EventSink`], and writes frames queued by [`Transport::send`]. Frames are
//! only accepted while the socket is open.

use super::handshake::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use super::{Connector, EventSink, ReadyState, Transport, TransportError};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

/// Close code reported when the peer sent a close frame without a status
const CLOSE_NO_STATUS: u16 = 1005;

/// Opens real WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, target: &Url, events: EventSink) -> Result<Box<dyn Transport>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Construction(e.to_string()))?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        debug!(connection_id = events.id(), "Opening WebSocket to {}", target);
        let task = runtime.spawn(run_socket(
            target.clone(),
            outgoing_rx,
            ready.clone(),
            events,
        ));

        Ok(Box::new(WebSocketTransport {
            outgoing: outgoing_tx,
            ready,
            task,
        }))
    }
}

/// Instruction for the socket task
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Handle to one WebSocket connection
pub struct WebSocketTransport {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    ready: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outgoing
            .send(Outgoing::Text(frame.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        match self.ready_state() {
            ReadyState::Connecting => {
                // Nothing to say to a peer we never finished meeting.
                self.task.abort();
                self.ready.store(ReadyState::Closed as u8, Ordering::SeqCst);
            }
            ReadyState::Open => {
                self.ready.store(ReadyState::Closing as u8, Ordering::SeqCst);
                let _ = self.outgoing.send(Outgoing::Close {
                    code,
                    reason: reason.to_string(),
                });
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::SeqCst))
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // An open socket notices the closed channel and sends a normal close.
        if self.ready_state() == ReadyState::Connecting {
            self.task.abort();
        }
    }
}

/// Socket task: handshake, then pump frames both ways until either side closes
async fn run_socket(
    target: Url,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    ready: Arc<AtomicU8>,
    events: EventSink,
) {
    let stream = match connect_async(target.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            ready.store(ReadyState::Closed as u8, Ordering::SeqCst);
            events.error(format!("WebSocket handshake failed: {e}"));
            events.closed(CLOSE_ABNORMAL, e.to_string());
            return;
        }
    };

    ready.store(ReadyState::Open as u8, Ordering::SeqCst);
    events.opened();

    let (mut sink, mut source) = stream.split();
    let (code, reason) = loop {
        tokio::select! {
            instruction = outgoing.recv() => match instruction {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        events.error(format!("WebSocket write failed: {e}"));
                        break (CLOSE_ABNORMAL, e.to_string());
                    }
                }
                Some(Outgoing::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: Cow::Owned(reason.clone()),
                    };
                    if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
                        debug!("Close frame not delivered: {}", e);
                    }
                    break (code, reason);
                }
                None => {
                    let frame = CloseFrame {
                        code: CloseCode::from(CLOSE_NORMAL),
                        reason: Cow::Borrowed("transport dropped"),
                    };
                    let _ = sink.send(WsMessage::Close(Some(frame))).await;
                    break (CLOSE_NORMAL, "transport dropped".to_string());
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    events.message(text);
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        events.message(text);
                    }
                    Err(_) => {
                        warn!("Dropping non UTF-8 binary frame");
                        events.error("non UTF-8 binary frame dropped");
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    break frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.error(format!("WebSocket read failed: {e}"));
                    break (CLOSE_ABNORMAL, e.to_string());
                }
                None => break (CLOSE_ABNORMAL, "connection reset".to_string()),
            },
        }
    };

    ready.store(ReadyState::Closed as u8, Ordering::SeqCst);
    debug!(
        connection_id = events.id(),
        "WebSocket closed with code {} ({})", code, reason
    );
    events.closed(code, reason);
}
