//! Inbound frame routing tests


use rds_messaging::testing::MockConnector;
use rds_messaging::{
    ClientEvent, ConnectionSession, ConnectionState, ErrorKind, Message, MessageStatus,
    MessageType,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use test_helpers::*;

async fn session_with_message_hook() -> (ConnectionSession, MockConnector, Arc<Mutex<Vec<Message>>>) {
    let received: Arc<Mutex<Vec<Message>>> = Arc::default();
    let seen = received.clone();
    let connector = MockConnector::new();
    let session = ConnectionSession::builder(test_config(), Arc::new(connector.clone()))
        .on_message_received(move |m| seen.lock().unwrap().push(m.clone()))
        .spawn();
    connect(&session, &connector).await;
    (session, connector, received)
}

#[tokio::test(start_paused = true)]
async fn test_chat_frame_reaches_history_hook_and_subscribers() {
    let (session, connector, received) = session_with_message_hook().await;
    let mut events = session.subscribe();

    let mut frame = chat_frame("m-1", "bob", "hi alice");
    frame["username"] = json!("Bob");
    connector.deliver_json(frame);
    let status = session.status().await.unwrap();
    assert_eq!(status.stats.messages_received, 1);

    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 1);
    let message = &history[0];
    assert_eq!(message.id, "m-1");
    assert_eq!(message.kind, MessageType::Message);
    assert_eq!(message.status, MessageStatus::Received);
    assert_eq!(message.user_id.as_deref(), Some("bob"));
    assert_eq!(message.username.as_deref(), Some("Bob"));
    assert_eq!(message.timestamp, 1_700_000_000_000);

    assert_eq!(received.lock().unwrap().as_slice(), history.as_slice());
    match events.try_recv() {
        Ok(ClientEvent::MessageReceived(m)) => assert_eq!(m.id, "m-1"),
        other => panic!("expected MessageReceived, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_stop_processing() {
    let (session, connector, received) = session_with_message_hook().await;

    connector.deliver("{not json");
    connector.deliver(r#"{"type":"typing","isTyping":"yes"}"#);
    connector.deliver_json(chat_frame("m-2", "bob", "still here"));

    let status = session.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.stats.errors, 2);
    assert_eq!(status.last_error.unwrap().kind, ErrorKind::Parse);
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(contents(&session.history().await.unwrap()), vec!["still here"]);
}

#[tokio::test(start_paused = true)]
async fn test_system_frame_goes_to_history_only() {
    let (session, connector, received) = session_with_message_hook().await;
    let mut events = session.subscribe();

    connector.deliver(r#"{"type":"system","content":"bob joined"}"#);
    session.status().await.unwrap();

    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, MessageType::System);
    assert_eq!(history[0].content, "bob joined");
    assert!(!history[0].id.is_empty());
    assert!(history[0].timestamp > 0);

    assert!(received.lock().unwrap().is_empty());
    assert!(matches!(
        events.try_recv(),
        Ok(ClientEvent::SystemNotice(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_untyped_frames_are_ignored() {
    let (session, connector, received) = session_with_message_hook().await;

    connector.deliver(r#"{"type":"presence","userId":"bob"}"#);
    connector.deliver(r#"{"content":"no type"}"#);
    connector.deliver(r#"{"type":"ping","timestamp":1}"#);

    let status = session.status().await.unwrap();
    assert_eq!(status.stats.errors, 0);
    assert!(status.last_error.is_none());
    assert_eq!(status.history_len, 0);
    assert!(received.lock().unwrap().is_empty());
    assert!(connector.sent_of_type("pong").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pong_has_no_visible_effect() {
    let (session, connector, _received) = session_with_message_hook().await;
    let before = session.status().await.unwrap();
    let mut events = session.subscribe();

    connector.deliver(r#"{"type":"pong","timestamp":1700000000000}"#);
    let after = session.status().await.unwrap();

    assert_eq!(before, after);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_status_value_is_ignored() {
    let (session, connector, _received) = session_with_message_hook().await;

    connector.deliver(r#"{"type":"status","status":"sleeping"}"#);
    let status = session.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.stats.errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_hook_does_not_kill_session() {
    let connector = MockConnector::new();
    let session = ConnectionSession::builder(test_config(), Arc::new(connector.clone()))
        .on_message_received(|_| panic!("hook failure"))
        .spawn();
    connect(&session, &connector).await;

    connector.deliver_json(chat_frame("m-1", "bob", "boom"));
    connector.deliver_json(chat_frame("m-2", "bob", "again"));

    let status = session.status().await.unwrap();
    assert_eq!(status.stats.messages_received, 2);
    assert_eq!(status.history_len, 2);
}

#[tokio::test(start_paused = true)]
async fn test_messages_flow_after_reconnect() {
    let (session, connector, received) = session_with_message_hook().await;

    // Lose the first connection, then reconnect
    connector.drop_connection(1006);
    session.status().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
    session.status().await.unwrap();
    connector.accept();
    session.status().await.unwrap();

    connector.deliver_json(chat_frame("m-new", "bob", "fresh"));
    session.status().await.unwrap();
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(received.lock().unwrap()[0].id, "m-new");
}
