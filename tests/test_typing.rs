//! Typing indicator tests
//!
//! Remote indicators lapse `typing_debounce + 500ms` after the last
//! `typing=true`; local typing is withdrawn after the same quiet period.


use rds_messaging::ClientEvent;
use serde_json::{json, Value};
use std::time::Duration;
use test_helpers::*;
use tokio::time::sleep;

fn typing_flags(connector: &rds_messaging::testing::MockConnector) -> Vec<bool> {
    connector
        .sent_of_type("typing")
        .iter()
        .filter_map(|frame| frame["isTyping"].as_bool())
        .collect()
}

fn typing_ids(snapshot: &rds_messaging::SessionSnapshot) -> Vec<String> {
    snapshot.typing.iter().map(|u| u.user_id.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_remote_typing_added_and_removed() {
    let (session, connector) = connected_session(test_config()).await;
    let mut events = session.subscribe();

    let mut frame = typing_frame("bob", true);
    frame["username"] = json!("Bob");
    connector.deliver_json(frame);
    connector.deliver_json(typing_frame("carol", true));
    let status = session.status().await.unwrap();
    assert_eq!(typing_ids(&status), vec!["bob", "carol"]);
    assert_eq!(status.typing[0].display_name, "Bob");
    assert_eq!(status.typing[1].display_name, "carol");

    connector.deliver_json(typing_frame("bob", false));
    let status = session.status().await.unwrap();
    assert_eq!(typing_ids(&status), vec!["carol"]);

    let mut changes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::TypingChanged(users) = event {
            changes.push(users.len());
        }
    }
    assert_eq!(changes, vec![1, 2, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_remote_typing_expires_without_stop_frame() {
    let (session, connector) = connected_session(test_config()).await;

    connector.deliver_json(typing_frame("bob", true));
    session.status().await.unwrap();

    sleep(Duration::from_millis(1499)).await;
    assert_eq!(typing_ids(&session.status().await.unwrap()), vec!["bob"]);

    sleep(Duration::from_millis(1)).await;
    assert!(session.status().await.unwrap().typing.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_typing_refreshes_expiry() {
    let (session, connector) = connected_session(test_config()).await;
    let mut events = session.subscribe();

    connector.deliver_json(typing_frame("bob", true));
    session.status().await.unwrap();
    sleep(Duration::from_millis(1000)).await;
    connector.deliver_json(typing_frame("bob", true));
    session.status().await.unwrap();

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(typing_ids(&session.status().await.unwrap()), vec!["bob"]);
    sleep(Duration::from_millis(500)).await;
    assert!(session.status().await.unwrap().typing.is_empty());

    // One event for the add, one for the lapse; the refresh is silent
    let mut changes = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ClientEvent::TypingChanged(_)) {
            changes += 1;
        }
    }
    assert_eq!(changes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_frame_for_unknown_user_is_silent() {
    let (session, connector) = connected_session(test_config()).await;
    let mut events = session.subscribe();

    connector.deliver_json(typing_frame("nobody", false));
    session.status().await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_local_typing_sends_once_then_withdraws() {
    let (session, connector) = connected_session(test_config()).await;

    session.input_changed("h").unwrap();
    let status = session.status().await.unwrap();
    assert!(status.local_typing);
    assert_eq!(typing_flags(&connector), vec![true]);

    sleep(Duration::from_millis(500)).await;
    session.input_changed("he").unwrap();
    session.input_changed("hel").unwrap();
    session.status().await.unwrap();
    assert_eq!(typing_flags(&connector), vec![true]);

    // Quiet period restarts from the last keystroke at 500ms
    sleep(Duration::from_millis(1499)).await;
    assert!(session.status().await.unwrap().local_typing);
    sleep(Duration::from_millis(1)).await;
    assert!(!session.status().await.unwrap().local_typing);
    assert_eq!(typing_flags(&connector), vec![true, false]);

    let frames: Vec<Value> = connector.sent_of_type("typing");
    assert_eq!(frames[0]["userId"], "alice");
    assert_eq!(frames[0]["sessionId"], "session-1");
}

#[tokio::test(start_paused = true)]
async fn test_clearing_input_keeps_typing_until_quiet() {
    let (session, connector) = connected_session(test_config()).await;

    session.input_changed("h").unwrap();
    session.status().await.unwrap();
    sleep(Duration::from_millis(1000)).await;
    session.input_changed("").unwrap();
    session.status().await.unwrap();

    // The cleared input restarted the quiet period at 1000ms
    sleep(Duration::from_millis(1499)).await;
    assert!(session.status().await.unwrap().local_typing);
    assert_eq!(typing_flags(&connector), vec![true]);

    sleep(Duration::from_millis(1)).await;
    assert!(!session.status().await.unwrap().local_typing);
    assert_eq!(typing_flags(&connector), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_blank_input_does_not_start_typing() {
    let (session, connector) = connected_session(test_config()).await;

    session.input_changed("   ").unwrap();
    assert!(!session.status().await.unwrap().local_typing);
    assert!(typing_flags(&connector).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_typing_withdraws_immediately() {
    let (session, connector) = connected_session(test_config()).await;

    session.input_changed("draft").unwrap();
    session.stop_typing().unwrap();
    assert!(!session.status().await.unwrap().local_typing);
    assert_eq!(typing_flags(&connector), vec![true, false]);

    // Nothing further once the idle timeout would have passed
    sleep(Duration::from_secs(5)).await;
    session.status().await.unwrap();
    assert_eq!(typing_flags(&connector), vec![true, false]);

    // A second stop is a no-op
    session.stop_typing().unwrap();
    session.status().await.unwrap();
    assert_eq!(typing_flags(&connector), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_no_typing_frames_while_disconnected() {
    let (session, connector) = spawn_session(test_config());

    session.input_changed("offline draft").unwrap();
    session.status().await.unwrap();
    sleep(Duration::from_secs(2)).await;
    session.status().await.unwrap();

    assert_eq!(connector.open_attempts(), 0);
    assert!(connector.sent_frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_typing_state() {
    let (session, connector) = connected_session(test_config()).await;

    connector.deliver_json(typing_frame("bob", true));
    session.input_changed("draft").unwrap();
    session.status().await.unwrap();

    session.disconnect().unwrap();
    let status = session.status().await.unwrap();
    assert!(status.typing.is_empty());
    assert!(!status.local_typing);
    assert_eq!(typing_flags(&connector), vec![true, false]);
}
