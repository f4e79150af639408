//! Common test utilities for beacon-client integration tests
//!
//! `MockEventsServer` speaks enough of the events protocol to drive the
//! client without a real backend: it answers `auth` frames, confirms
//! subscriptions, answers pings and records every frame it receives. Tests
//! can push frames, kick connected clients and stop listening to simulate an
//! unreachable server.

#![allow(dead_code)]

use beacon_client::{Event, EventKind, EventsClient, EventsClientBuilder};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Token the mock server accepts
pub const TOKEN: &str = "test-token";

/// User the mock server authenticates
pub const USER_ID: &str = "user-1";

/// Upper bound for any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Kick,
}

#[derive(Clone)]
struct Behavior {
    answer_auth: Arc<AtomicBool>,
    confirm_subscriptions: Arc<AtomicBool>,
}

impl Behavior {
    fn reply_to(&self, frame: &Value) -> Option<String> {
        let reply = match frame["type"].as_str()? {
            "auth" if self.answer_auth.load(Ordering::SeqCst) => {
                if frame["token"] == TOKEN {
                    json!({
                        "type": "connected",
                        "user_id": USER_ID,
                        "message": "Welcome",
                        "system_subscriptions": [{"domain": "system", "resource": "announcement"}]
                    })
                } else {
                    json!({"type": "auth_error", "error": "Invalid token"})
                }
            }
            "subscribe" if self.confirm_subscriptions.load(Ordering::SeqCst) => json!({
                "type": "subscription_confirmed",
                "subscription_id": frame["subscription_id"],
                "domain": frame["domain"],
                "resource": frame["resource"],
                "filters": frame["options"]["filters"]
            }),
            "ping" => json!({"type": "pong"}),
            _ => return None,
        };
        Some(reply.to_string())
    }
}

/// Mock events server for client testing
pub struct MockEventsServer {
    addr: SocketAddr,
    frames_rx: mpsc::UnboundedReceiver<Value>,
    closes_rx: mpsc::UnboundedReceiver<Option<u16>>,
    control_tx: broadcast::Sender<Control>,
    stop_tx: Option<oneshot::Sender<()>>,
    connections: Arc<AtomicUsize>,
    behavior: Behavior,
}

impl MockEventsServer {
    /// Start a server on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (closes_tx, closes_rx) = mpsc::unbounded_channel();
        let (control_tx, _) = broadcast::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let connections = Arc::new(AtomicUsize::new(0));
        let behavior = Behavior {
            answer_auth: Arc::new(AtomicBool::new(true)),
            confirm_subscriptions: Arc::new(AtomicBool::new(true)),
        };

        let accept_control = control_tx.clone();
        let accept_behavior = behavior.clone();
        let accept_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        tokio::spawn(serve_connection(
                            stream,
                            accept_behavior.clone(),
                            frames_tx.clone(),
                            closes_tx.clone(),
                            accept_control.subscribe(),
                            Arc::clone(&accept_connections),
                        ));
                    }
                }
            }
        });

        Self {
            addr,
            frames_rx,
            closes_rx,
            control_tx,
            stop_tx: Some(stop_tx),
            connections,
            behavior,
        }
    }

    /// HTTP base URL the client derives its endpoint from
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of WebSocket handshakes accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop answering `auth` frames
    pub fn set_answer_auth(&self, answer: bool) {
        self.behavior.answer_auth.store(answer, Ordering::SeqCst);
    }

    /// Stop confirming subscriptions automatically
    pub fn set_confirm_subscriptions(&self, confirm: bool) {
        self.behavior
            .confirm_subscriptions
            .store(confirm, Ordering::SeqCst);
    }

    /// Send a frame to every connected client
    pub fn push(&self, frame: Value) {
        self.push_raw(frame.to_string());
    }

    /// Send raw text to every connected client
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.control_tx.send(Control::Push(text.into()));
    }

    /// Close every connection with code 1001
    pub fn kick(&self) {
        let _ = self.control_tx.send(Control::Kick);
    }

    /// Stop accepting connections and kick the existing ones
    pub fn stop_listening(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.kick();
    }

    /// Next frame received from any client
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.frames_rx.recv())
            .await
            .expect("Timed out waiting for a client frame")
            .expect("Server stopped")
    }

    /// Next frame of the given type, skipping others (e.g. pings)
    pub async fn next_frame_of(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// A frame received within `within`, if any
    pub async fn try_next_frame(&mut self, within: Duration) -> Option<Value> {
        tokio::time::timeout(within, self.frames_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Close code of the next client-initiated close
    pub async fn next_close(&mut self) -> Option<u16> {
        tokio::time::timeout(WAIT, self.closes_rx.recv())
            .await
            .expect("Timed out waiting for a close frame")
            .expect("Server stopped")
    }
}

async fn serve_connection(
    stream: TcpStream,
    behavior: Behavior,
    frames_tx: mpsc::UnboundedSender<Value>,
    closes_tx: mpsc::UnboundedSender<Option<u16>>,
    mut control_rx: broadcast::Receiver<Control>,
    connections: Arc<AtomicUsize>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            control = control_rx.recv() => match control {
                Ok(Control::Push(text)) => {
                    let _ = ws.send(Message::Text(text)).await;
                }
                Ok(Control::Kick) | Err(RecvError::Closed) => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "Server going away".into(),
                    };
                    let _ = ws.close(Some(frame)).await;
                    return;
                }
                Err(RecvError::Lagged(_)) => {}
            },
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    let _ = frames_tx.send(frame.clone());
                    if let Some(reply) = behavior.reply_to(&frame) {
                        let _ = ws.send(Message::Text(reply)).await;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = closes_tx.send(frame.map(|f| u16::from(f.code)));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            }
        }
    }
}

/// Builder pointed at the mock server with short timings
pub fn builder(server: &MockEventsServer) -> EventsClientBuilder {
    EventsClient::builder(server.base_url())
        .token(TOKEN)
        .reconnect_delay(Duration::from_millis(50))
        .max_reconnect_delay(Duration::from_secs(1))
        .connect_timeout(Duration::from_secs(2))
        .subscribe_timeout(Duration::from_secs(2))
        .ping_interval(Duration::ZERO)
}

/// Base URL of a port nobody listens on
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Record every event the client emits
pub fn record_events(client: &EventsClient) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::Notification,
        EventKind::SystemNotification,
        EventKind::Error,
        EventKind::SubscriptionConfirmed,
        EventKind::Reconnecting,
    ] {
        let tx = tx.clone();
        client.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

/// Next recorded event of the given kind, skipping others
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("Event stream closed");
            if event.kind() == kind {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {:?} event", kind))
}

/// Drain events recorded so far without waiting
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
