//! Connection task for the events channel
//!
//! One task per client owns the socket, the subscription registry and every
//! timer. Client handles talk to it through [`Command`]s; everything it
//! observes goes out through the [`EventDispatcher`] and the state watch
//! channel. Handles never touch the socket directly.
//!
//! # Event Loop
//!
//! Each iteration waits on whichever comes first:
//!
//! - a command from a client handle
//! - completion of an in-flight socket establishment
//! - an inbound WebSocket message
//! - the handshake deadline (socket open + `connected` ack)
//! - the keep-alive ping timer
//! - the reconnect timer
//! - the earliest subscription confirmation deadline
//!
//! # Handshake
//!
//! ```text
//! connect() ──► socket open ──► {"type":"auth","token":...} ──► "connected"
//!                   │                                              │
//!                   └─ no token: close 1008, MissingCredential     └─ Open
//! ```
//!
//! # Reconnection
//!
//! Automatic reconnection is armed by the first successful authentication
//! after `connect()` and disarmed by `disconnect()` or by running out of
//! attempts. A failed attempt counts as a close and schedules the next one.
//! Confirmed subscriptions survive unexpected closes and are requested again
//! (with their original IDs and options) once an automatic reconnection
//! authenticates. A connection that authenticates without any prior retry
//! starts from an empty subscription table.

use crate::client_builder::EventsConfig;
use crate::connection_state::{ConnectionState, ReconnectState};
use crate::dispatcher::{DisconnectReason, Event, EventDispatcher};
use crate::metrics::ClientMetrics;
use crate::subscription::{SubscriptionRegistry, SubscriptionRequest, Waiter};
use beacon_core::{
    codec, ClientFrame, ConnectAck, Error, Result, ServerFrame, Subscription,
    SubscriptionConfirmation,
};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OpenFuture = BoxFuture<'static, std::result::Result<WsStream, tungstenite::Error>>;

/// Requests from client handles to the connection task
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<ConnectAck>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        request: SubscriptionRequest,
        reply: oneshot::Sender<Result<Subscription>>,
    },
    Unsubscribe {
        subscription_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SendTyping {
        chat_id: String,
        event: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<Subscription>>,
    },
}

#[derive(Default)]
struct Timers {
    handshake: Option<Instant>,
    ping: Option<Instant>,
    reconnect: Option<Instant>,
}

/// Owner of the events socket
pub(crate) struct ConnectionManager {
    config: EventsConfig,
    endpoint: String,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    token: Arc<RwLock<Option<String>>>,
    dispatcher: EventDispatcher,
    registry: SubscriptionRegistry,
    reconnect: ReconnectState,
    reconnect_attempts: Arc<AtomicU32>,
    metrics: Option<Arc<ClientMetrics>>,
    socket: Option<WsStream>,
    opening: Option<OpenFuture>,
    connect_waiter: Option<oneshot::Sender<Result<ConnectAck>>>,
    timers: Timers,
    manual_close: bool,
    reconnect_armed: bool,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: EventsConfig,
        endpoint: String,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<ConnectionState>,
        token: Arc<RwLock<Option<String>>>,
        dispatcher: EventDispatcher,
        reconnect: ReconnectState,
        reconnect_attempts: Arc<AtomicU32>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        Self {
            config,
            endpoint,
            commands,
            state,
            token,
            dispatcher,
            registry: SubscriptionRegistry::new(),
            reconnect,
            reconnect_attempts,
            metrics,
            socket: None,
            opening: None,
            connect_waiter: None,
            timers: Timers::default(),
            manual_close: false,
            reconnect_armed: false,
        }
    }

    /// Run until every client handle is dropped
    pub(crate) async fn run(mut self) {
        loop {
            let subscription_deadline = self.registry.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!("All client handles dropped, stopping connection task");
                        self.teardown().await;
                        return;
                    }
                },
                opened = poll_opening(&mut self.opening) => {
                    self.opening = None;
                    self.on_socket_opened(opened).await;
                }
                message = next_message(&mut self.socket) => self.on_message(message).await,
                _ = wait_until(self.timers.handshake) => self.on_handshake_timeout().await,
                _ = wait_until(self.timers.ping) => self.on_ping_due().await,
                _ = wait_until(self.timers.reconnect) => self.on_reconnect_due(),
                _ = wait_until(subscription_deadline) => self.on_subscription_deadline(),
            }
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
            if let Some(ref m) = self.metrics {
                m.update_connection_state(state);
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => match self.current_state() {
                ConnectionState::Open => {
                    let _ = reply.send(Err(Error::AlreadyConnected));
                }
                ConnectionState::Connecting
                | ConnectionState::Authenticating
                | ConnectionState::Closing => {
                    let _ = reply.send(Err(Error::ConnectionInProgress));
                }
                ConnectionState::Disconnected => {
                    self.manual_close = false;
                    self.timers.reconnect = None;
                    self.connect_waiter = Some(reply);
                    self.open_socket();
                }
            },
            Command::Disconnect { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
            Command::Subscribe { request, reply } => {
                if !self.current_state().is_open() {
                    let _ = reply.send(Err(Error::NotConnected));
                    return;
                }
                let subscription_id = self.registry.generate_id();
                tracing::debug!(
                    subscription_id = %subscription_id,
                    domain = %request.domain,
                    resource = %request.resource,
                    "Subscribing"
                );
                self.request_subscription(subscription_id, request, Waiter::Caller(reply))
                    .await;
            }
            Command::Unsubscribe {
                subscription_id,
                reply,
            } => {
                if !self.current_state().is_open() {
                    let _ = reply.send(Err(Error::NotConnected));
                    return;
                }
                let known = self.registry.remove_active(&subscription_id)
                    | self.registry.cancel_pending(&subscription_id);
                let result = self
                    .send(&ClientFrame::Unsubscribe {
                        subscription_id: subscription_id.clone(),
                    })
                    .await;
                tracing::debug!(subscription_id = %subscription_id, known, "Unsubscribed");
                let _ = reply.send(result);
            }
            Command::SendTyping {
                chat_id,
                event,
                reply,
            } => {
                let result = if self.current_state().is_open() {
                    self.send(&ClientFrame::TypingEvent { chat_id, event }).await
                } else {
                    Err(Error::NotConnected)
                };
                let _ = reply.send(result);
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn open_socket(&mut self) {
        self.set_state(ConnectionState::Connecting);
        self.timers.handshake = Some(Instant::now() + self.config.connect_timeout);

        let endpoint = self.endpoint.clone();
        tracing::info!(endpoint = %endpoint, "Connecting to events channel");
        self.opening = Some(Box::pin(async move {
            connect_async(endpoint).await.map(|(stream, _)| stream)
        }));
    }

    async fn on_socket_opened(&mut self, opened: std::result::Result<WsStream, tungstenite::Error>) {
        let mut socket = match opened {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open events socket");
                self.on_socket_closed(None, e.to_string(), Some(Error::Transport(e.to_string())));
                return;
            }
        };

        let token = self
            .token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .filter(|token| !token.is_empty());

        let Some(token) = token else {
            tracing::warn!("No bearer token set, aborting events connection");
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: "Missing bearer token".into(),
            };
            if let Err(e) = socket.close(Some(frame)).await {
                tracing::debug!(error = %e, "Close handshake failed");
            }
            self.on_socket_closed(
                Some(u16::from(CloseCode::Policy)),
                "Missing bearer token".to_string(),
                Some(Error::MissingCredential),
            );
            return;
        };

        self.socket = Some(socket);
        self.set_state(ConnectionState::Authenticating);
        if let Err(e) = self.send(&ClientFrame::Auth { token }).await {
            self.on_socket_closed(None, e.to_string(), Some(e));
        }
    }

    async fn on_message(&mut self, message: Option<std::result::Result<Message, tungstenite::Error>>) {
        match message {
            Some(Ok(Message::Text(text))) => self.on_text(&text).await,
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => self.on_text(&text).await,
                Err(_) => tracing::debug!("Dropping non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                    .unwrap_or((None, String::new()));
                tracing::info!(code = ?code, reason = %reason, "Server closed events channel");
                self.on_socket_closed(code, reason, None);
            }
            // Control frames are answered by tungstenite itself
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Events socket error");
                self.on_socket_closed(None, e.to_string(), Some(Error::Transport(e.to_string())));
            }
            None => self.on_socket_closed(None, "Connection ended".to_string(), None),
        }
    }

    async fn on_text(&mut self, text: &str) {
        let frame = match codec::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        match frame {
            ServerFrame::Connected(ack) => self.on_authenticated(ack).await,
            ServerFrame::AuthError { error } => self.on_auth_rejected(error).await,
            ServerFrame::SubscriptionConfirmed(confirmation) => {
                self.on_subscription_confirmed(confirmation)
            }
            ServerFrame::Unsubscribed { subscription_id } => {
                if self.registry.remove_active(&subscription_id) {
                    tracing::debug!(subscription_id = %subscription_id, "Server dropped subscription");
                }
            }
            ServerFrame::Notification(notification) => {
                if let Some(ref m) = self.metrics {
                    m.record_notification(&notification.domain);
                }
                self.dispatcher.emit(&Event::Notification(notification));
            }
            ServerFrame::SystemNotification(notification) => {
                self.dispatcher
                    .emit(&Event::SystemNotification(notification));
            }
            ServerFrame::Pong {} => tracing::trace!("Pong received"),
            ServerFrame::Error { message, code } => {
                tracing::warn!(message = %message, code = ?code, "Server reported an error");
                self.report(Error::Server { message, code });
            }
            ServerFrame::Unknown => tracing::debug!("Ignoring frame of unknown type"),
        }
    }

    async fn on_authenticated(&mut self, ack: ConnectAck) {
        if self.current_state() != ConnectionState::Authenticating {
            tracing::debug!("Ignoring unexpected connected frame");
            return;
        }

        self.timers.handshake = None;
        self.set_state(ConnectionState::Open);
        let previous_attempts = self.reconnect.reset();
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.reconnect_armed = true;
        self.schedule_ping();

        tracing::info!(user_id = %ack.user_id, "Events channel authenticated");
        if previous_attempts > 0 {
            if let Some(ref m) = self.metrics {
                m.record_reconnection_success();
            }
        }

        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Ok(ack.clone()));
        }
        self.dispatcher.emit(&Event::Connect(ack));

        if previous_attempts > 0 {
            self.replay_subscriptions().await;
        } else {
            self.registry.clear_active();
        }
    }

    async fn on_auth_rejected(&mut self, reason: String) {
        tracing::warn!(reason = %reason, "Authentication rejected");
        self.close_socket(CloseCode::Policy, "Authentication failed")
            .await;
        self.on_socket_closed(
            Some(u16::from(CloseCode::Policy)),
            reason.clone(),
            Some(Error::AuthenticationFailed(reason)),
        );
    }

    fn on_subscription_confirmed(&mut self, confirmation: SubscriptionConfirmation) {
        let subscription = match self.registry.confirm(confirmation.clone()) {
            Some(subscription) => {
                tracing::debug!(subscription_id = %subscription.id, "Subscription confirmed");
                if let Some(ref m) = self.metrics {
                    m.record_subscription_confirmed(&subscription.domain);
                }
                subscription
            }
            None => {
                tracing::debug!(
                    subscription_id = %confirmation.subscription_id,
                    "Confirmation without a pending request"
                );
                Subscription::from(confirmation)
            }
        };
        self.dispatcher
            .emit(&Event::SubscriptionConfirmed(subscription));
    }

    async fn replay_subscriptions(&mut self) {
        let entries = self.registry.take_for_replay();
        if entries.is_empty() {
            return;
        }

        tracing::info!(count = entries.len(), "Restoring subscriptions");
        for (subscription_id, request) in entries {
            self.request_subscription(subscription_id, request, Waiter::Replay)
                .await;
        }
    }

    async fn request_subscription(
        &mut self,
        subscription_id: String,
        request: SubscriptionRequest,
        waiter: Waiter,
    ) {
        let frame = ClientFrame::Subscribe {
            subscription_id: subscription_id.clone(),
            domain: request.domain.clone(),
            resource: request.resource.clone(),
            options: request.options.clone(),
        };
        let deadline = Instant::now() + self.config.subscribe_timeout;
        self.registry
            .register(subscription_id.clone(), request, deadline, waiter);

        if let Err(e) = self.send(&frame).await {
            self.registry.fail(&subscription_id, e);
        }
    }

    fn on_subscription_deadline(&mut self) {
        for subscription_id in self.registry.expire(Instant::now()) {
            tracing::warn!(subscription_id = %subscription_id, "Subscription confirmation timed out");
            if let Some(ref m) = self.metrics {
                m.record_subscription_timeout();
            }
        }
    }

    async fn on_handshake_timeout(&mut self) {
        self.timers.handshake = None;
        tracing::warn!(
            state = %self.current_state(),
            timeout_ms = self.config.connect_timeout.as_millis() as u64,
            "Events handshake timed out"
        );
        self.close_socket(CloseCode::Normal, "Handshake timed out")
            .await;
        self.on_socket_closed(None, "Handshake timed out".to_string(), Some(Error::Timeout));
    }

    fn schedule_ping(&mut self) {
        if !self.config.ping_interval.is_zero() {
            self.timers.ping = Some(Instant::now() + self.config.ping_interval);
        }
    }

    async fn on_ping_due(&mut self) {
        self.timers.ping = None;
        if !self.current_state().is_open() {
            return;
        }

        match self.send(&ClientFrame::Ping).await {
            Ok(()) => self.schedule_ping(),
            Err(e) => {
                tracing::warn!(error = %e, "Keep-alive ping failed");
                self.on_socket_closed(None, e.to_string(), Some(e));
            }
        }
    }

    /// Common path for every way a socket can go away except `disconnect()`
    fn on_socket_closed(&mut self, code: Option<u16>, reason: String, error: Option<Error>) {
        self.socket = None;
        self.opening = None;
        self.timers.handshake = None;
        self.timers.ping = None;
        self.set_state(ConnectionState::Disconnected);
        self.registry.fail_all_pending(Error::ConnectionClosed);

        match (self.connect_waiter.take(), error) {
            (Some(waiter), error) => {
                let _ = waiter.send(Err(error.unwrap_or(Error::ConnectionClosed)));
            }
            (None, Some(error)) => self.report(error),
            (None, None) => {}
        }

        self.dispatcher.emit(&Event::Disconnect(DisconnectReason {
            code,
            reason,
            voluntary: false,
        }));

        if self.config.auto_reconnect && self.reconnect_armed && !self.manual_close {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.next_attempt() {
            Some((attempt, delay)) => {
                self.reconnect_attempts.store(attempt, Ordering::SeqCst);
                self.timers.reconnect = Some(Instant::now() + delay);
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.dispatcher
                    .emit(&Event::Reconnecting { attempt, delay });
            }
            None => {
                let attempts = self.reconnect.attempt();
                self.reconnect_armed = false;
                tracing::error!(attempts, "Giving up on reconnection");
                self.report(Error::MaxReconnectAttemptsExceeded { attempts });
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        self.timers.reconnect = None;
        if self.current_state() != ConnectionState::Disconnected {
            return;
        }

        tracing::info!(attempt = self.reconnect.attempt(), "Reconnecting");
        if let Some(ref m) = self.metrics {
            m.record_reconnection_attempt();
        }
        self.open_socket();
    }

    /// Client-initiated shutdown; idempotent
    async fn teardown(&mut self) {
        self.manual_close = true;
        self.reconnect_armed = false;

        let was_active = self.socket.is_some()
            || self.opening.is_some()
            || self.timers.reconnect.is_some();
        tracing::debug!(
            pending = self.registry.pending_count(),
            active = self.registry.active_count(),
            "Tearing down events channel"
        );

        self.timers = Timers::default();
        self.opening = None;

        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Err(Error::ConnectionClosed));
        }
        self.registry.fail_all_pending(Error::ConnectionClosed);
        self.registry.clear_active();

        if self.socket.is_some() {
            self.set_state(ConnectionState::Closing);
            self.close_socket(CloseCode::Normal, "Client disconnect")
                .await;
        }
        self.set_state(ConnectionState::Disconnected);
        self.reconnect.reset();
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        if was_active {
            tracing::info!("Events channel disconnected");
            self.dispatcher.emit(&Event::Disconnect(DisconnectReason {
                code: Some(u16::from(CloseCode::Normal)),
                reason: "Client disconnect".to_string(),
                voluntary: true,
            }));
        }
    }

    async fn close_socket(&mut self, code: CloseCode, reason: &'static str) {
        if let Some(mut socket) = self.socket.take() {
            let frame = CloseFrame {
                code,
                reason: reason.into(),
            };
            if let Err(e) = socket.close(Some(frame)).await {
                tracing::debug!(error = %e, "Close handshake failed");
            }
        }
    }

    /// Write a frame to the current socket
    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        let text = codec::encode(frame)?;
        let socket = self.socket.as_mut().ok_or(Error::NotConnected)?;
        socket
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        tracing::trace!(frame = frame.kind(), "Frame sent");
        if let Some(ref m) = self.metrics {
            m.record_frame_sent(frame.kind());
        }
        Ok(())
    }

    /// Surface an error that has no caller waiting for it
    fn report(&self, error: Error) {
        if let Some(ref m) = self.metrics {
            m.record_error(error.kind());
        }
        self.dispatcher.emit(&Event::Error(error));
    }
}

async fn poll_opening(
    opening: &mut Option<OpenFuture>,
) -> std::result::Result<WsStream, tungstenite::Error> {
    match opening {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_message(
    socket: &mut Option<WsStream>,
) -> Option<std::result::Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
