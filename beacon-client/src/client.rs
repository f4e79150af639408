//! Events channel client
//!
//! [`EventsClient`] is a cheap, cloneable handle to one events channel. All
//! clones share the same connection task, listeners and bearer token. When
//! the last clone is dropped the task closes the socket (code 1000) and
//! exits.
//!
//! # Examples
//!
//! ```rust,no_run
//! use beacon_client::EventsClient;
//! use beacon_core::SubscribeOptions;
//! use serde_json::json;
//!
//! # async fn example() -> beacon_core::Result<()> {
//! let client = EventsClient::builder("https://api.example.com")
//!     .token("secret")
//!     .build()?;
//!
//! client.on_notification(|n| println!("{} {}.{}", n.event, n.domain, n.resource));
//!
//! let ack = client.connect().await?;
//! println!("Connected as {}", ack.user_id);
//!
//! let subscription = client
//!     .subscribe(
//!         "chat",
//!         "message",
//!         SubscribeOptions::new().filter("chat_ids", json!(["c1"])),
//!     )
//!     .await?;
//!
//! client.send_typing_event("c1", "start").await?;
//! client.unsubscribe(&subscription.id).await?;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

use crate::client_builder::EventsClientBuilder;
use crate::connection::Command;
use crate::connection_state::ConnectionState;
use crate::dispatcher::{DisconnectReason, Event, EventDispatcher, EventKind, ListenerId};
use crate::subscription::SubscriptionRequest;
use beacon_core::{
    ConnectAck, Error, Notification, Result, SubscribeOptions, Subscription, SystemNotification,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Handle to an events channel
#[derive(Clone)]
pub struct EventsClient {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) token: Arc<RwLock<Option<String>>>,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) reconnect_attempts: Arc<AtomicU32>,
    pub(crate) endpoint: Arc<str>,
}

impl EventsClient {
    /// Start configuring a client for the given HTTP(S) base URL
    pub fn builder(base_url: impl Into<String>) -> EventsClientBuilder {
        EventsClientBuilder::new(base_url)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Open the socket and authenticate
    ///
    /// Resolves with the server's acknowledgement once the `connected` frame
    /// arrives.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` / `ConnectionInProgress` if the channel is open
    ///   or a handshake is under way
    /// - `MissingCredential` if no bearer token is set (no frame is sent)
    /// - `AuthenticationFailed` if the server rejects the token
    /// - `Timeout` if no acknowledgement arrives within the connect window
    /// - `Transport` if the socket fails before authentication completes
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn connect(&self) -> Result<ConnectAck> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Close the channel with code 1000 and stop reconnecting
    ///
    /// Pending subscribe calls fail with `ConnectionClosed` and the table of
    /// confirmed subscriptions is cleared. Calling this while already
    /// disconnected does nothing.
    pub async fn disconnect(&self) {
        // The task only goes away once every handle is dropped
        let _ = self.request(|reply| Command::Disconnect { reply }).await;
    }

    /// Subscribe to a domain/resource pair
    ///
    /// Resolves with the subscription as confirmed by the server (its
    /// filters may differ from the requested ones).
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the channel is not open
    /// - `SubscriptionTimeout` if no confirmation arrives within the
    ///   subscribe window
    /// - `ConnectionClosed` if the connection drops first
    #[tracing::instrument(
        skip_all,
        fields(domain = tracing::field::Empty, resource = tracing::field::Empty)
    )]
    pub async fn subscribe(
        &self,
        domain: impl Into<String>,
        resource: impl Into<String>,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        let request = SubscriptionRequest {
            domain: domain.into(),
            resource: resource.into(),
            options,
        };
        let span = tracing::Span::current();
        span.record("domain", request.domain.as_str());
        span.record("resource", request.resource.as_str());

        self.request(|reply| Command::Subscribe { request, reply })
            .await?
    }

    /// Drop a subscription
    ///
    /// Fire-and-forget: the `unsubscribe` frame is written and the local
    /// entry removed without waiting for the server. Unknown IDs are still
    /// forwarded.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let subscription_id = subscription_id.to_string();
        self.request(|reply| Command::Unsubscribe {
            subscription_id,
            reply,
        })
        .await?
    }

    /// Send a typing indicator for a chat (fire-and-forget)
    pub async fn send_typing_event(
        &self,
        chat_id: impl Into<String>,
        event: impl Into<String>,
    ) -> Result<()> {
        let chat_id = chat_id.into();
        let event = event.into();
        self.request(|reply| Command::SendTyping {
            chat_id,
            event,
            reply,
        })
        .await?
    }

    /// Replace the bearer token used by the next handshake
    ///
    /// An already-authenticated connection is not affected.
    pub fn set_bearer_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = Some(token.into());
    }

    /// Forget the bearer token
    pub fn clear_bearer_token(&self) {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Whether the channel is authenticated and open
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Reconnect attempts made since the last successful authentication
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// WebSocket endpoint this client connects to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Confirmed subscriptions
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.request(|reply| Command::Subscriptions { reply })
            .await
            .unwrap_or_default()
    }

    /// Listener registry shared by every clone of this client
    pub fn events(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Register a listener for one kind of event
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, listener)
    }

    /// Remove a listener
    pub fn off(&self, id: ListenerId) -> bool {
        self.dispatcher.off(id)
    }

    /// Number of listeners registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.dispatcher.listener_count(kind)
    }

    pub fn on_connect<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ConnectAck) + Send + Sync + 'static,
    {
        self.dispatcher.on_connect(f)
    }

    pub fn on_disconnect<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.dispatcher.on_disconnect(f)
    }

    pub fn on_notification<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.dispatcher.on_notification(f)
    }

    pub fn on_system_notification<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&SystemNotification) + Send + Sync + 'static,
    {
        self.dispatcher.on_system_notification(f)
    }

    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.dispatcher.on_error(f)
    }

    pub fn on_subscription_confirmed<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Subscription) + Send + Sync + 'static,
    {
        self.dispatcher.on_subscription_confirmed(f)
    }

    pub fn on_reconnecting<F>(&self, f: F) -> ListenerId
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.dispatcher.on_reconnecting(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> EventsClient {
        EventsClient::builder("http://127.0.0.1:9").build().unwrap()
    }

    #[tokio::test]
    async fn test_operations_require_open_channel() {
        let client = client();

        let result = client
            .subscribe("chat", "message", SubscribeOptions::new())
            .await;
        assert!(matches!(result, Err(Error::NotConnected)));

        assert!(matches!(
            client.unsubscribe("sub_1").await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client.send_typing_event("c1", "start").await,
            Err(Error::NotConnected)
        ));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let client = client();
        let disconnects = Arc::new(AtomicU32::new(0));
        let d = Arc::clone(&disconnects);
        client.on_disconnect(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        client.disconnect().await;
        client.disconnect().await;

        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_listeners_shared_between_clones() {
        let client = client();
        let clone = client.clone();

        let id = clone.on_error(|_| {});
        assert_eq!(client.listener_count(EventKind::Error), 1);
        assert!(client.off(id));
        assert_eq!(clone.listener_count(EventKind::Error), 0);
    }

    #[tokio::test]
    async fn test_bearer_token_shared_between_clones() {
        let client = client();
        let clone = client.clone();

        clone.set_bearer_token("fresh");
        assert_eq!(client.token.read().unwrap().as_deref(), Some("fresh"));

        client.clear_bearer_token();
        assert!(clone.token.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscriptions_empty_initially() {
        assert!(client().subscriptions().await.is_empty());
    }
}
