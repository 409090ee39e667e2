//! RDS Messaging - resilient real-time messaging client
//!
//! A client for a persistent, bidirectional JSON-over-WebSocket chat channel
//! that survives network interruptions on its own.
//!
//! # Overview
//!
//! This crate provides:
//! - Wire frames and the conversation data model
//! - A WebSocket transport behind a small [`Transport`](transport::Transport) trait
//! - Automatic reconnection with exponential backoff and a bounded retry budget
//! - Heartbeats while connected
//! - An outbound queue that redelivers failed messages in order after reconnecting
//! - Debounced local typing indicators and expiring remote ones
//!
//! # Quick Start
//!
//! ```rust
//! use rds_messaging::testing::MockConnector;
//! use rds_messaging::{ClientConfig, ConnectionSession, ConnectionState};
//! use std::sync::Arc;
//!
//! tokio_test::block_on(async {
//!     let connector = MockConnector::new();
//!     let config = ClientConfig::new("ws://localhost:9000/ws", "alice", "session-1")
//!         .with_auto_connect(false);
//!     let session = ConnectionSession::spawn(config, Arc::new(connector.clone()));
//!
//!     // Offline sends are kept and delivered after the next connect
//!     let delivery = session.send_message("hello").await.unwrap();
//!     assert!(!delivery.is_sent());
//!
//!     session.connect().unwrap();
//!     session.status().await.unwrap();
//!     connector.accept();
//!
//!     let status = session.status().await.unwrap();
//!     assert_eq!(status.state, ConnectionState::Connected);
//!     assert_eq!(status.pending, 0);
//!     assert_eq!(connector.sent_of_type("message").len(), 1);
//!
//!     session.shutdown().await.unwrap();
//! });
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult, ErrorKind, SendError, SessionError};
pub use protocol::{ConnectionState, Message, MessageStatus, MessageType};
pub use session::{ClientEvent, ConnectionSession, Delivery, SessionSnapshot};
pub use transport::{Connector, Transport, WebSocketConnector};
