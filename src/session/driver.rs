//! Session driver task
//!
//! The only place session state is mutated. One loop iteration handles one
//! input: a transport event, a timer expiry or a handle command. Transport
//! events are polled first so frames already received are processed before
//! any command issued after them.

use super::heartbeat::HeartbeatMonitor;
use super::history::MessageHistory;
use super::queue::OutboundQueue;
use super::reconnect::{ReconnectPolicy, ReconnectScheduler, ReconnectionDecision};
use super::router::{InboundRoute, InboundRouter};
use super::stats::SessionStats;
use super::timer::OneShot;
use super::typing::{TypingCoalescer, TypingSet, TYPING_GRACE};
use super::{ClientEvent, Delivery, ErrorHook, MessageHook, SessionSnapshot};
use crate::config::ClientConfig;
use crate::error::{SendError, SessionError};
use crate::protocol::{ConnectionState, Frame, Message, MessageStatus};
use crate::transport::{
    build_handshake_target, send_frame, ConnectionId, Connector, EventSink, Transport,
    TransportError, TransportEvent, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Requests from session handles
pub(crate) enum Command {
    Connect,
    Disconnect,
    Send {
        content: String,
        reply: oneshot::Sender<Result<Delivery, SendError>>,
    },
    InputChanged(String),
    StopTyping,
    ClearHistory,
    History(oneshot::Sender<Vec<Message>>),
    Pending(oneshot::Sender<Vec<Message>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Caller callbacks
#[derive(Default)]
pub(crate) struct Hooks {
    pub on_message: Option<MessageHook>,
    pub on_error: Option<ErrorHook>,
}

pub(crate) struct SessionDriver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    hooks: Hooks,

    commands: mpsc::UnboundedReceiver<Command>,
    transport_tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    transport_rx: mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<ClientEvent>,

    transport: Option<Box<dyn Transport>>,
    /// Id of `transport`; events tagged with any other id are stale
    connection_id: ConnectionId,
    next_connection_id: ConnectionId,
    state: ConnectionState,
    disconnect_requested: bool,

    reconnect: ReconnectScheduler,
    heartbeat: HeartbeatMonitor,
    local_typing: TypingCoalescer,
    typing_peers: TypingSet,
    typing_expiry: OneShot,

    history: MessageHistory,
    pending: OutboundQueue,
    stats: SessionStats,
    last_error: Option<SessionError>,
}

impl SessionDriver {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        hooks: Hooks,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let typing_debounce = config.messages.typing_debounce();

        Self {
            reconnect: ReconnectScheduler::new(ReconnectPolicy::from_config(&config.connection)),
            heartbeat: HeartbeatMonitor::new(config.connection.heartbeat_interval()),
            local_typing: TypingCoalescer::new(typing_debounce),
            typing_peers: TypingSet::new(typing_debounce + TYPING_GRACE),
            typing_expiry: OneShot::new(),
            history: MessageHistory::new(config.messages.history_limit),
            pending: OutboundQueue::new(config.messages.max_pending),
            config,
            connector,
            hooks,
            commands,
            transport_tx,
            transport_rx,
            snapshot_tx,
            events,
            transport: None,
            connection_id: 0,
            next_connection_id: 0,
            state: ConnectionState::Disconnected,
            disconnect_requested: false,
            stats: SessionStats::default(),
            last_error: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(endpoint = %self.config.session.endpoint, "Messaging session started");
        if self.config.session.auto_connect {
            self.connect();
        }
        self.publish_snapshot();

        loop {
            let keep_running = tokio::select! {
                biased;

                Some((id, event)) = self.transport_rx.recv() => {
                    self.on_transport_event(id, event);
                    true
                }
                attempt = self.reconnect.fired() => {
                    self.on_reconnect_timer(attempt);
                    true
                }
                _ = self.heartbeat.tick() => {
                    self.on_heartbeat();
                    true
                }
                was_typing = self.local_typing.expired() => {
                    if was_typing {
                        self.send_typing(false);
                    }
                    true
                }
                _ = self.typing_expiry.expired() => {
                    self.on_typing_expiry();
                    true
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        self.teardown();
                        let _ = ack.send(());
                        false
                    }
                    Some(command) => {
                        self.handle_command(command);
                        true
                    }
                    None => {
                        debug!("All session handles dropped");
                        self.teardown();
                        false
                    }
                },
            };

            self.publish_snapshot();
            if !keep_running {
                break;
            }
        }
        info!("Messaging session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Send { content, reply } => {
                let result = self.send_message(&content);
                let _ = reply.send(result);
            }
            Command::InputChanged(content) => {
                if self.local_typing.input_changed(&content) == Some(true) {
                    self.send_typing(true);
                }
            }
            Command::StopTyping => {
                if self.local_typing.stop() {
                    self.send_typing(false);
                }
            }
            Command::ClearHistory => {
                debug!("Clearing {} history entries", self.history.len());
                self.history.clear();
            }
            Command::History(reply) => {
                let _ = reply.send(self.history.to_vec());
            }
            Command::Pending(reply) => {
                let _ = reply.send(self.pending.to_vec());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(ack) => {
                self.teardown();
                let _ = ack.send(());
            }
        }
    }

    // Connection lifecycle

    fn transport_is_live(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.ready_state().is_live())
    }

    fn transport_is_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Manual connect; a fresh attempt with a fresh retry budget
    fn connect(&mut self) {
        if self.transport_is_live() {
            debug!("Connect ignored: transport already open or opening");
            return;
        }
        self.disconnect_requested = false;
        if self.reconnect.is_pending() {
            debug!("Manual connect replaces the pending reconnect");
        }
        self.reconnect.reset();
        self.open_transport();
    }

    fn open_transport(&mut self) {
        if let Some(mut stale) = self.transport.take() {
            stale.close(CLOSE_NORMAL, "replaced");
        }
        self.set_state(ConnectionState::Connecting);

        let session = &self.config.session;
        let target =
            match build_handshake_target(&session.endpoint, &session.user_id, &session.session_id) {
                Ok(target) => target,
                Err(e) => return self.on_open_failed(e),
            };

        self.next_connection_id += 1;
        let id = self.next_connection_id;
        let _span = crate::connection_span!(connection_id = id).entered();
        debug!("Opening transport to {}", target);

        match self
            .connector
            .open(&target, EventSink::new(id, self.transport_tx.clone()))
        {
            Ok(transport) => {
                self.transport = Some(transport);
                self.connection_id = id;
            }
            Err(e) => self.on_open_failed(e),
        }
    }

    /// Construction failures take the same path as an abnormal close
    fn on_open_failed(&mut self, error: TransportError) {
        error!("Failed to create transport: {}", error);
        self.report(SessionError::transport(error.to_string()));
        self.set_state(ConnectionState::Disconnected);
        self.after_close(CLOSE_ABNORMAL);
    }

    fn on_transport_event(&mut self, id: ConnectionId, event: TransportEvent) {
        if self.transport.is_none() || id != self.connection_id {
            debug!(connection_id = id, "Dropping event from stale transport: {:?}", event);
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(text) => self.on_frame(&text),
            TransportEvent::Error(detail) => {
                warn!(connection_id = id, "Transport error: {}", detail);
                self.report(SessionError::transport(detail));
            }
            TransportEvent::Closed { code, reason } => self.on_closed(code, &reason),
        }
    }

    fn on_open(&mut self) {
        self.reconnect.reset();
        self.last_error = None;
        self.stats.record_open();
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();
        self.flush_pending();
    }

    fn on_closed(&mut self, code: u16, reason: &str) {
        self.transport = None;
        self.heartbeat.stop();
        if code == CLOSE_NORMAL {
            info!("Connection closed by peer: {}", reason);
        } else {
            warn!("Connection lost with code {}: {}", code, reason);
        }
        self.set_state(ConnectionState::Disconnected);
        self.after_close(code);
    }

    fn after_close(&mut self, code: u16) {
        if let ReconnectionDecision::Exhausted { attempts } =
            self.reconnect.on_close(code, self.disconnect_requested)
        {
            self.set_state(ConnectionState::Failed);
            self.report(SessionError::exhausted_retries(attempts));
        }
    }

    fn on_reconnect_timer(&mut self, attempt: u32) {
        info!(
            "Reconnecting (attempt {}/{})",
            attempt,
            self.reconnect.policy().max_retries
        );
        self.stats.reconnect_attempts += 1;
        self.open_transport();
    }

    fn on_heartbeat(&mut self) {
        match self.transport.as_mut() {
            Some(transport) if transport.is_open() => {
                match send_frame(&mut **transport, &Frame::ping()) {
                    Ok(()) => debug!("Heartbeat sent"),
                    Err(e) => debug!("Heartbeat not sent: {}", e),
                }
            }
            _ => {
                debug!("Transport not open, stopping heartbeat");
                self.heartbeat.stop();
            }
        }
    }

    fn disconnect(&mut self) {
        info!("Disconnect requested");
        self.disconnect_requested = true;
        self.cancel_timers();
        if let Some(mut transport) = self.transport.take() {
            transport.close(CLOSE_NORMAL, "client disconnect");
        }
        self.set_state(ConnectionState::Disconnected);
        if self.typing_peers.clear() {
            self.broadcast(ClientEvent::TypingChanged(Vec::new()));
        }
    }

    /// Cancel every timer. A set local typing flag is withdrawn first while
    /// the transport can still carry it.
    fn cancel_timers(&mut self) {
        if self.reconnect.cancel() {
            debug!("Pending reconnect cancelled");
        }
        self.heartbeat.stop();
        if self.local_typing.stop() {
            self.send_typing(false);
        }
        self.typing_expiry.cancel();
    }

    fn teardown(&mut self) {
        self.disconnect();
        debug!("Session torn down");
    }

    // Outbound

    fn send_message(&mut self, content: &str) -> Result<Delivery, SendError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SendError::EmptyContent);
        }

        let message = Message::outgoing(
            content,
            &self.config.session.user_id,
            &self.config.session.session_id,
        );
        self.history.push(message.clone());

        // Older queued messages go first; a message that cannot overtake them waits behind them
        if self.transport_is_open() && self.flush_pending() {
            if let Some(transport) = self.transport.as_mut() {
                match send_frame(&mut **transport, &Frame::chat(&message)) {
                    Ok(()) => {
                        self.history.set_status(&message.id, MessageStatus::Sent);
                        self.stats.messages_sent += 1;
                        debug!(message_id = %message.id, "Message sent");
                        return Ok(Delivery::Sent(message.id));
                    }
                    Err(e) => {
                        warn!(message_id = %message.id, "Send failed: {}", e);
                        self.report(SessionError::send_failure(format!(
                            "Message {} queued after send failure: {e}",
                            message.id
                        )));
                    }
                }
            }
        } else {
            debug!(
                message_id = %message.id,
                state = %self.state,
                backlog = self.pending.len(),
                "Queueing message"
            );
            // A stalled flush has already reported its own failure
            if !self.transport_is_open() {
                self.report(SessionError::send_failure(format!(
                    "Message {} queued: not connected ({})",
                    message.id, self.state
                )));
            }
        }

        self.queue_failed(message)
    }

    fn queue_failed(&mut self, message: Message) -> Result<Delivery, SendError> {
        let id = message.id.clone();
        self.history.set_status(&id, MessageStatus::Failed);
        self.stats.messages_failed += 1;

        match self.pending.enqueue(message) {
            Ok(()) => Ok(Delivery::Queued(id)),
            Err(_) => {
                let capacity = self.pending.capacity();
                self.report(SessionError::send_failure(format!(
                    "Pending queue full ({capacity} messages), message {id} dropped"
                )));
                Err(SendError::QueueFull { capacity })
            }
        }
    }

    /// Resend queued messages in order; returns whether the queue is now empty
    fn flush_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };

        let report = self
            .pending
            .flush(|message| send_frame(&mut **transport, &Frame::chat(message)));

        for id in &report.sent {
            self.history.set_status(id, MessageStatus::Sent);
        }
        self.stats.messages_sent += report.sent.len() as u64;
        info!(
            "Flushed {} pending messages, {} remaining",
            report.sent.len(),
            report.remaining
        );

        if let Some(e) = report.error {
            warn!("Pending flush stopped: {}", e);
            self.report(SessionError::send_failure(format!(
                "{} queued messages still pending: {e}",
                report.remaining
            )));
        }
        report.remaining == 0
    }

    fn send_typing(&mut self, is_typing: bool) {
        let Some(transport) = self.transport.as_mut().filter(|t| t.is_open()) else {
            debug!(is_typing, "Typing indicator not sent: transport not open");
            return;
        };
        let frame = Frame::typing(
            &self.config.session.user_id,
            &self.config.session.session_id,
            is_typing,
        );
        if let Err(e) = send_frame(&mut **transport, &frame) {
            debug!("Typing indicator not sent: {}", e);
        }
    }

    // Inbound

    fn on_frame(&mut self, raw: &str) {
        match InboundRouter::route(raw) {
            Ok(route) => self.apply_route(route),
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                self.report(SessionError::parse(e.to_string()));
            }
        }
    }

    fn apply_route(&mut self, route: InboundRoute) {
        match route {
            InboundRoute::Liveness => debug!("Pong received"),
            InboundRoute::Chat(message) => {
                debug!(message_id = %message.id, "Message received");
                self.stats.messages_received += 1;
                self.history.push(message.clone());
                if let Some(hook) = &self.hooks.on_message {
                    if catch_unwind(AssertUnwindSafe(|| hook(&message))).is_err() {
                        error!("on_message_received hook panicked");
                    }
                }
                self.broadcast(ClientEvent::MessageReceived(message));
            }
            InboundRoute::System(message) => {
                info!("System notice: {}", message.content);
                self.history.push(message.clone());
                self.broadcast(ClientEvent::SystemNotice(message));
            }
            InboundRoute::Typing { user, is_typing } => {
                let changed = if is_typing {
                    self.typing_peers.insert(user, Instant::now())
                } else {
                    self.typing_peers.remove(&user.user_id)
                };
                self.rearm_typing_expiry();
                if changed {
                    self.broadcast(ClientEvent::TypingChanged(self.typing_peers.users()));
                }
            }
            InboundRoute::Status(state) => {
                debug!("Server pushed status {}", state);
                self.set_state(state);
            }
            InboundRoute::Ignored(reason) => debug!("Ignoring frame: {}", reason),
        }
    }

    fn on_typing_expiry(&mut self) {
        let expired = self.typing_peers.prune(Instant::now());
        if !expired.is_empty() {
            debug!("Typing indicators lapsed for {:?}", expired);
            self.broadcast(ClientEvent::TypingChanged(self.typing_peers.users()));
        }
        self.rearm_typing_expiry();
    }

    fn rearm_typing_expiry(&mut self) {
        match self.typing_peers.next_expiry() {
            Some(deadline) => self.typing_expiry.arm_at(deadline),
            None => {
                self.typing_expiry.cancel();
            }
        }
    }

    // State and reporting

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        log_state_transition(self.state, next);
        self.state = next;
        self.broadcast(ClientEvent::StatusChanged(next));
    }

    fn report(&mut self, error: SessionError) {
        self.stats.errors += 1;
        self.last_error = Some(error.clone());
        if let Some(hook) = &self.hooks.on_error {
            if catch_unwind(AssertUnwindSafe(|| hook(&error))).is_err() {
                error!("on_error hook panicked");
            }
        }
        self.broadcast(ClientEvent::Error(error));
    }

    fn broadcast(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            retry_counter: self.reconnect.retry_counter(),
            reconnect_pending: self.reconnect.is_pending(),
            pending: self.pending.len(),
            history_len: self.history.len(),
            last_error: self.last_error.clone(),
            typing: self.typing_peers.users(),
            local_typing: self.local_typing.is_active(),
            stats: self.stats.clone(),
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

/// Log a connection state transition
fn log_state_transition(from: ConnectionState, to: ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("Connection established");
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => {
            warn!("Connection lost or closed");
        }
        (_, ConnectionState::Failed) => {
            error!("Connection failed, waiting for a manual connect");
        }
        _ => {
            info!("Connection state: {} -> {}", from, to);
        }
    }
}
