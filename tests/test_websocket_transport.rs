//! WebSocket transport tests against a local tokio-tungstenite server
//!
//! These run in real time; every wait is bounded by a timeout.

use futures_util::{SinkExt, StreamExt};
use rds_messaging::{
    ClientConfig, ClientEvent, ConnectionSession, ConnectionState, SessionSnapshot,
    WebSocketConnector,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Accept one client, returning the socket and the request URI it used
async fn accept_one(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let _ = uri_tx.send(request.uri().to_string());
        Ok(response)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap();
    (ws, uri_rx.await.unwrap())
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(format!("ws://{addr}/ws"), "alice", "session-1")
}

async fn wait_for_state(
    watch: &mut watch::Receiver<SessionSnapshot>,
    state: ConnectionState,
) -> SessionSnapshot {
    timeout(WAIT, watch.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .unwrap()
        .clone()
}

#[tokio::test]
async fn test_websocket_round_trip() {
    let (listener, addr) = listener().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Value>();
    let (uri_tx, uri_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut ws, uri) = accept_one(&listener).await;
        let _ = uri_tx.send(uri);
        let greeting = json!({
            "type": "message",
            "id": "srv-1",
            "content": "welcome",
            "timestamp": 1_700_000_000_000i64,
            "userId": "server-bot",
        });
        ws.send(WsMessage::Text(greeting.to_string())).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let WsMessage::Text(text) = message {
                if let Ok(value) = serde_json::from_str(&text) {
                    let _ = frames_tx.send(value);
                }
            }
        }
    });

    let session = ConnectionSession::spawn(client_config(addr), Arc::new(WebSocketConnector::new()));
    let mut events = session.subscribe();
    let mut watch = session.watch();
    wait_for_state(&mut watch, ConnectionState::Connected).await;

    let uri = timeout(WAIT, uri_rx).await.unwrap().unwrap();
    assert_eq!(uri, "/ws?userId=alice&sessionId=session-1");

    let received = timeout(WAIT, async {
        loop {
            if let Ok(ClientEvent::MessageReceived(message)) = events.recv().await {
                return message;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(received.id, "srv-1");
    assert_eq!(received.content, "welcome");

    let delivery = session.send_message("hello server").await.unwrap();
    assert!(delivery.is_sent());

    let frame = timeout(WAIT, async {
        loop {
            let frame = frames_rx.recv().await.unwrap();
            if frame["type"] == "message" {
                return frame;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(frame["content"], "hello server");
    assert_eq!(frame["id"], delivery.id());

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_clean_close_leaves_session_disconnected() {
    let (listener, addr) = listener().await;
    let (go_tx, go_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        let _ = go_rx.await;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await;
        while ws.next().await.is_some() {}
    });

    let session = ConnectionSession::spawn(client_config(addr), Arc::new(WebSocketConnector::new()));
    let mut watch = session.watch();
    wait_for_state(&mut watch, ConnectionState::Connected).await;
    go_tx.send(()).unwrap();

    let status = wait_for_state(&mut watch, ConnectionState::Disconnected).await;
    assert!(!status.reconnect_pending);
}

#[tokio::test]
async fn test_client_disconnect_sends_normal_close() {
    let (listener, addr) = listener().await;
    let (code_tx, code_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        while let Some(Ok(message)) = ws.next().await {
            if let WsMessage::Close(frame) = message {
                let _ = code_tx.send(frame.map(|f| u16::from(f.code)));
                break;
            }
        }
    });

    let session = ConnectionSession::spawn(client_config(addr), Arc::new(WebSocketConnector::new()));
    let mut watch = session.watch();
    wait_for_state(&mut watch, ConnectionState::Connected).await;

    session.disconnect().unwrap();
    let code = timeout(WAIT, code_rx).await.unwrap().unwrap();
    assert_eq!(code, Some(1000));
    assert_eq!(session.status().await.unwrap().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // Reserve a port, then free it so nothing is listening there
    let (listener, addr) = listener().await;
    drop(listener);

    let mut config = client_config(addr);
    config.connection.max_retries = 2;
    config.connection.retry_delay_ms = 10;

    let session = ConnectionSession::spawn(config, Arc::new(WebSocketConnector::new()));
    let mut watch = session.watch();
    let status = wait_for_state(&mut watch, ConnectionState::Failed).await;

    assert_eq!(status.stats.reconnect_attempts, 2);
    assert_eq!(status.stats.connections, 0);
    assert_eq!(
        status.last_error.unwrap().kind,
        rds_messaging::ErrorKind::ExhaustedRetries
    );
}
