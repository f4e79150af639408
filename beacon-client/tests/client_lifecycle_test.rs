//! Client lifecycle integration tests
//!
//! Tests for the authentication handshake, disconnection, state reporting and
//! routing of server frames to listeners.

mod common;

use beacon_client::{ConnectionState, Event, EventKind, EventsClient};
use beacon_core::Error;
use common::{builder, next_event, record_events, MockEventsServer, TOKEN, USER_ID};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_connect_authenticates_in_band() {
    let mut server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let mut events = record_events(&client);

    let ack = client.connect().await.unwrap();
    assert_eq!(ack.user_id, USER_ID);
    assert_eq!(ack.message.as_deref(), Some("Welcome"));
    assert_eq!(ack.system_subscriptions.len(), 1);

    // The first frame on the wire is the credential
    let first = server.next_frame().await;
    assert_eq!(first, json!({"type": "auth", "token": TOKEN}));

    assert!(client.is_connected());
    assert_eq!(client.state(), ConnectionState::Open);

    match next_event(&mut events, EventKind::Connect).await {
        Event::Connect(ack) => assert_eq!(ack.user_id, USER_ID),
        other => panic!("Expected Connect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_when_open_fails() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();

    client.connect().await.unwrap();
    let result = client.connect().await;

    assert!(matches!(result, Err(Error::AlreadyConnected)));
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_concurrent_connect_rejected() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();

    let (first, second) = tokio::join!(client.connect(), client.connect());

    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::ConnectionInProgress)));
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_missing_token_sends_no_frame() {
    let mut server = MockEventsServer::start().await;
    let client = EventsClient::builder(server.base_url())
        .ping_interval(Duration::ZERO)
        .build()
        .unwrap();

    let result = client.connect().await;
    assert!(matches!(result, Err(Error::MissingCredential)));

    // Closed with policy violation and nothing written before it
    assert_eq!(server.next_close().await, Some(1008));
    assert!(server.try_next_frame(Duration::from_millis(200)).await.is_none());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_empty_token_treated_as_missing() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    client.set_bearer_token("");

    assert!(matches!(client.connect().await, Err(Error::MissingCredential)));
}

#[tokio::test]
async fn test_token_set_after_build_is_used() {
    let mut server = MockEventsServer::start().await;
    let client = EventsClient::builder(server.base_url())
        .ping_interval(Duration::ZERO)
        .build()
        .unwrap();

    client.set_bearer_token(TOKEN);
    client.connect().await.unwrap();

    assert_eq!(server.next_frame_of("auth").await["token"], TOKEN);
}

#[tokio::test]
async fn test_auth_error_rejects_connect() {
    let mut server = MockEventsServer::start().await;
    let client = builder(&server).token("wrong-token").build().unwrap();

    match client.connect().await {
        Err(Error::AuthenticationFailed(reason)) => assert_eq!(reason, "Invalid token"),
        other => panic!("Expected AuthenticationFailed, got {:?}", other),
    }

    assert_eq!(server.next_close().await, Some(1008));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_times_out_without_ack() {
    let server = MockEventsServer::start().await;
    server.set_answer_auth(false);
    let client = builder(&server)
        .connect_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let result = client.connect().await;

    assert!(matches!(result, Err(Error::Timeout)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_to_unreachable_server() {
    let client = EventsClient::builder(common::unreachable_base_url().await)
        .token(TOKEN)
        .build()
        .unwrap();

    let result = client.connect().await;

    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connect_again_after_failure() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).token("wrong-token").build().unwrap();

    assert!(client.connect().await.is_err());

    client.set_bearer_token(TOKEN);
    assert!(client.connect().await.is_ok());
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn test_disconnect_graceful() {
    let mut server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let mut events = record_events(&client);

    client.connect().await.unwrap();
    client.disconnect().await;

    assert_eq!(server.next_close().await, Some(1000));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    match next_event(&mut events, EventKind::Disconnect).await {
        Event::Disconnect(reason) => {
            assert!(reason.voluntary);
            assert_eq!(reason.code, Some(1000));
        }
        other => panic!("Expected Disconnect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&disconnects);
    client.on_disconnect(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });

    client.connect().await.unwrap();
    client.disconnect().await;
    client.disconnect().await;

    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropping_last_handle_closes_socket() {
    let mut server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let clone = client.clone();

    client.connect().await.unwrap();
    drop(client);

    // A clone is still alive: the socket stays open
    assert!(clone.is_connected());

    drop(clone);
    assert_eq!(server.next_close().await, Some(1000));
}

#[tokio::test]
async fn test_state_changes_observable() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let mut states = client.state_changes();

    client.connect().await.unwrap();
    states
        .wait_for(|state| *state == ConnectionState::Open)
        .await
        .unwrap();

    client.disconnect().await;
    states
        .wait_for(|state| *state == ConnectionState::Disconnected)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_error_frame_reaches_error_listeners() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let mut events = record_events(&client);

    client.connect().await.unwrap();
    server.push(json!({"type": "error", "message": "Rate limited", "code": 429}));

    match next_event(&mut events, EventKind::Error).await {
        Event::Error(Error::Server { message, code }) => {
            assert_eq!(message, "Rate limited");
            assert_eq!(code.as_deref(), Some("429"));
        }
        other => panic!("Expected server error, got {:?}", other),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_system_notification_dispatched() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let mut events = record_events(&client);

    client.connect().await.unwrap();
    server.push(json!({
        "type": "system_notification",
        "event": "maintenance",
        "domain": "system",
        "resource": "status",
        "action": "reload",
        "message": "Deploy in 5 minutes"
    }));

    match next_event(&mut events, EventKind::SystemNotification).await {
        Event::SystemNotification(n) => {
            assert_eq!(n.event, "maintenance");
            assert_eq!(n.action.as_deref(), Some("reload"));
        }
        other => panic!("Expected SystemNotification, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_and_unknown_frames_ignored() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();
    let mut events = record_events(&client);

    client.connect().await.unwrap();
    server.push_raw("{not json");
    server.push(json!({"type": "presence", "user_id": "u2"}));
    server.push(json!({"no_type": true}));
    server.push(json!({
        "type": "notification",
        "subscription_id": "sub_1",
        "domain": "chat",
        "resource": "message",
        "event": "created"
    }));

    // Only the valid notification comes through; nothing is reported as an error
    next_event(&mut events, EventKind::Notification).await;
    let errors: Vec<Event> = common::drain_events(&mut events)
        .into_iter()
        .filter(|e| e.kind() == EventKind::Error)
        .collect();
    assert!(errors.is_empty());
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_typing_event_written() {
    let mut server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();

    client.connect().await.unwrap();
    client.send_typing_event("chat-7", "start").await.unwrap();

    let frame = server.next_frame_of("typing_event").await;
    assert_eq!(
        frame,
        json!({"type": "typing_event", "chat_id": "chat-7", "event": "start"})
    );
}

#[tokio::test]
async fn test_keepalive_pings_while_open() {
    let mut server = MockEventsServer::start().await;
    let client = builder(&server)
        .ping_interval(Duration::from_millis(100))
        .build()
        .unwrap();

    client.connect().await.unwrap();

    assert_eq!(server.next_frame_of("ping").await, json!({"type": "ping"}));
    assert_eq!(server.next_frame_of("ping").await, json!({"type": "ping"}));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_panicking_listener_does_not_break_channel() {
    let server = MockEventsServer::start().await;
    let client = builder(&server).build().unwrap();

    client.on_connect(|_| panic!("listener bug"));
    let mut events = record_events(&client);

    client.connect().await.unwrap();
    next_event(&mut events, EventKind::Connect).await;

    client.send_typing_event("c1", "stop").await.unwrap();
    assert!(client.is_connected());
}
