//! Mock implementations for testing
//!
//! [`MockConnector`] hands out [`MockTransport`]s and keeps a record of every
//! connection it opened. Tests drive the socket side by hand: accept or
//! refuse the handshake, deliver frames, drop the connection, and inspect
//! what the session wrote.

use crate::transport::{Connector, EventSink, ReadyState, Transport, TransportError};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

#[derive(Debug)]
struct MockConnection {
    target: Url,
    events: EventSink,
    ready: ReadyState,
    sent: Vec<String>,
    closed_with: Option<(u16, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    connections: Vec<MockConnection>,
    open_attempts: usize,
    failing_opens: usize,
    failing_sends: bool,
}

/// Scriptable connector; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` calls to `open` fail synchronously
    pub fn fail_next_opens(&self, n: usize) {
        self.lock().failing_opens = n;
    }

    /// Make every send on every connection fail until switched off
    pub fn set_send_failure(&self, failing: bool) {
        self.lock().failing_sends = failing;
    }

    /// Calls to `open`, failed ones included
    pub fn open_attempts(&self) -> usize {
        self.lock().open_attempts
    }

    /// Transports actually created
    pub fn open_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Transports open or still handshaking
    pub fn live_count(&self) -> usize {
        self.lock()
            .connections
            .iter()
            .filter(|c| c.ready.is_live())
            .count()
    }

    pub fn target(&self, index: usize) -> Option<Url> {
        self.lock().connections.get(index).map(|c| c.target.clone())
    }

    pub fn ready_state(&self, index: usize) -> Option<ReadyState> {
        self.lock().connections.get(index).map(|c| c.ready)
    }

    fn with_latest<R>(&self, f: impl FnOnce(&mut MockConnection) -> R) -> Option<R> {
        let mut state = self.lock();
        state.connections.last_mut().map(f)
    }

    /// Complete the handshake of the latest connection
    pub fn accept(&self) -> bool {
        self.with_latest(|c| {
            c.ready = ReadyState::Open;
            c.events.opened()
        })
        .unwrap_or(false)
    }

    /// Fail the handshake of the latest connection
    pub fn refuse(&self) -> bool {
        self.with_latest(|c| {
            c.ready = ReadyState::Closed;
            c.events.error("connection refused");
            c.events.closed(1006, "connection refused")
        })
        .unwrap_or(false)
    }

    /// Terminate the latest connection from the server side
    pub fn drop_connection(&self, code: u16) -> bool {
        self.with_latest(|c| {
            c.ready = ReadyState::Closed;
            c.events.closed(code, "closed by server")
        })
        .unwrap_or(false)
    }

    /// Report a socket error on the latest connection without closing it
    pub fn raise_error(&self, detail: &str) -> bool {
        self.with_latest(|c| c.events.error(detail)).unwrap_or(false)
    }

    /// Deliver a raw text frame on the latest connection
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        self.with_latest(|c| c.events.message(text)).unwrap_or(false)
    }

    pub fn deliver_json(&self, value: Value) -> bool {
        self.deliver(value.to_string())
    }

    /// Every frame written, across all connections, in order
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock()
            .connections
            .iter()
            .flat_map(|c| c.sent.iter().cloned())
            .collect()
    }

    pub fn sent_on(&self, index: usize) -> Vec<String> {
        self.lock()
            .connections
            .get(index)
            .map(|c| c.sent.clone())
            .unwrap_or_default()
    }

    /// Decoded frames of one `type`, across all connections
    pub fn sent_of_type(&self, kind: &str) -> Vec<Value> {
        self.sent_frames()
            .iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(|v| v.get("type").and_then(Value::as_str) == Some(kind))
            .collect()
    }

    /// Close code and reason the session used on a connection
    pub fn closed_with(&self, index: usize) -> Option<(u16, String)> {
        self.lock()
            .connections
            .get(index)
            .and_then(|c| c.closed_with.clone())
    }
}

impl Connector for MockConnector {
    fn open(&self, target: &Url, events: EventSink) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.lock();
        state.open_attempts += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(TransportError::Construction(
                "mock construction failure".to_string(),
            ));
        }

        state.connections.push(MockConnection {
            target: target.clone(),
            events,
            ready: ReadyState::Connecting,
            sent: Vec::new(),
            closed_with: None,
        });
        Ok(Box::new(MockTransport {
            index: state.connections.len() - 1,
            state: self.state.clone(),
        }))
    }
}

/// Transport half of a mock connection
#[derive(Debug)]
pub struct MockTransport {
    index: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        let failing = state.failing_sends;
        let connection = state
            .connections
            .get_mut(self.index)
            .ok_or(TransportError::Closed)?;
        if connection.ready != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        if failing {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        connection.sent.push(frame.to_string());
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let index = self.index;
        let mut state = self.lock();
        if let Some(connection) = state.connections.get_mut(index) {
            if connection.ready.is_live() {
                connection.ready = ReadyState::Closed;
                connection.closed_with = Some((code, reason.to_string()));
                connection.events.closed(code, reason);
            }
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.lock()
            .connections
            .get(self.index)
            .map(|c| c.ready)
            .unwrap_or(ReadyState::Closed)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let index = self.index;
        let mut state = self.lock();
        if let Some(connection) = state.connections.get_mut(index) {
            if connection.ready.is_live() {
                connection.ready = ReadyState::Closed;
            }
        }
    }
}
