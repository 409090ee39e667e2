//! Connection session
//!
//! [`ConnectionSession`] is a cheap, cloneable handle to a session driver
//! task. The driver owns the transport, every timer, the history, the
//! pending queue and the typing state, and processes transport events,
//! timer expiries and handle commands one at a time. Handles only send
//! commands and read published snapshots, so none of their methods block.
//!
//! When the last handle is dropped the driver tears the session down: every
//! timer is cancelled and the transport is closed with code 1000.

mod driver;
pub mod heartbeat;
pub mod history;
pub mod queue;
pub mod reconnect;
pub mod router;
pub mod stats;
pub mod timer;
pub mod typing;

pub use heartbeat::HeartbeatMonitor;
pub use history::MessageHistory;
pub use queue::{FlushReport, OutboundQueue};
pub use reconnect::{ReconnectPolicy, ReconnectScheduler, ReconnectionDecision, SuppressReason};
pub use router::{FrameError, InboundRoute, InboundRouter};
pub use stats::SessionStats;
pub use timer::{Debouncer, OneShot};
pub use typing::{TypingCoalescer, TypingSet, TypingUser, TYPING_GRACE};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, SendError, SessionError};
use crate::protocol::{ConnectionState, Message};
use crate::transport::Connector;
use driver::{Command, Hooks, SessionDriver};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::Instrument;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 256;

/// Callback invoked for every inbound chat message
pub type MessageHook = Arc<dyn Fn(&Message) + Send + Sync>;

/// Callback invoked for every reported error
pub type ErrorHook = Arc<dyn Fn(&SessionError) + Send + Sync>;

/// What happened to a message handed to [`ConnectionSession::send_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the open transport
    Sent(String),
    /// Not sent; marked failed and queued for the next connection
    Queued(String),
}

impl Delivery {
    /// Id of the created message
    pub fn id(&self) -> &str {
        match self {
            Delivery::Sent(id) | Delivery::Queued(id) => id,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent(_))
    }
}

/// Events published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    MessageReceived(Message),
    /// Server notice added to history
    SystemNotice(Message),
    StatusChanged(ConnectionState),
    /// Remote peers currently typing, after the change
    TypingChanged(Vec<TypingUser>),
    Error(SessionError),
}

/// Published view of session state, refreshed after every driver step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub retry_counter: u32,
    pub reconnect_pending: bool,
    /// Messages waiting in the pending queue
    pub pending: usize,
    pub history_len: usize,
    pub last_error: Option<SessionError>,
    /// Remote peers currently typing
    pub typing: Vec<TypingUser>,
    /// Whether this client is currently flagged as typing
    pub local_typing: bool,
    pub stats: SessionStats,
}

/// Configures hooks before the driver starts
pub struct SessionBuilder {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    hooks: Hooks,
}

impl SessionBuilder {
    pub fn on_message_received<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.hooks.on_message = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SessionError) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Start the driver task. Must be called from within a tokio runtime.
    pub fn spawn(self) -> ConnectionSession {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let span = crate::session_span!(
            user_id = %self.config.session.user_id,
            session_id = %self.config.session.session_id
        );
        let driver = SessionDriver::new(
            self.config,
            self.connector,
            self.hooks,
            command_rx,
            snapshot_tx,
            event_tx.clone(),
        );
        tokio::spawn(driver.run().instrument(span));

        ConnectionSession {
            commands: command_tx,
            snapshot: snapshot_rx,
            events: event_tx,
        }
    }
}

/// Handle to a running messaging session
#[derive(Clone)]
pub struct ConnectionSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<ClientEvent>,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionSession {
    pub fn builder(config: ClientConfig, connector: Arc<dyn Connector>) -> SessionBuilder {
        SessionBuilder {
            config,
            connector,
            hooks: Hooks::default(),
        }
    }

    /// Spawn a session without hooks
    pub fn spawn(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self::builder(config, connector).spawn()
    }

    fn command(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SessionClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> ClientResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(make(reply_tx))?;
        reply_rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// Open the connection. No-op while a transport is open or opening.
    pub fn connect(&self) -> ClientResult<()> {
        self.command(Command::Connect)
    }

    /// Close with code 1000 and cancel every timer; no automatic reconnect follows
    pub fn disconnect(&self) -> ClientResult<()> {
        self.command(Command::Disconnect)
    }

    /// Send a chat message.
    ///
    /// Blank content is rejected. Otherwise the message is added to history
    /// and either written to the open transport or marked failed and queued
    /// until the next successful connection.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<Delivery, SendError> {
        let content = content.into();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                content,
                reply: reply_tx,
            })
            .map_err(|_| SendError::SessionClosed)?;
        reply_rx.await.map_err(|_| SendError::SessionClosed)?
    }

    /// Report a change of the local input box for the typing indicator
    pub fn input_changed(&self, content: impl Into<String>) -> ClientResult<()> {
        self.command(Command::InputChanged(content.into()))
    }

    /// Clear the local typing flag now, e.g. when the input is submitted
    pub fn stop_typing(&self) -> ClientResult<()> {
        self.command(Command::StopTyping)
    }

    pub fn clear_history(&self) -> ClientResult<()> {
        self.command(Command::ClearHistory)
    }

    /// Current history, oldest first
    pub async fn history(&self) -> ClientResult<Vec<Message>> {
        self.request(Command::History).await
    }

    /// Messages waiting for the next connection, in send order
    pub async fn pending(&self) -> ClientResult<Vec<Message>> {
        self.request(Command::Pending).await
    }

    /// Snapshot taken after every command sent before this call was handled
    pub async fn status(&self) -> ClientResult<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Last published snapshot, without waiting for the driver
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Receiver that is notified whenever a new snapshot is published
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Whether the driver has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Tear the session down and wait for the driver to finish
    pub async fn shutdown(self) -> ClientResult<()> {
        self.request(Command::Shutdown).await
    }
}
