//! Real-time events channel for the beacon SDK
//!
//! This crate keeps one authenticated WebSocket connection to the platform's
//! events endpoint and turns what arrives on it into typed events.
//!
//! # Core Features
//!
//! - **In-band authentication**: the bearer token travels in the first frame
//! - **Subscriptions**: domain/resource topics with server-side filters,
//!   confirmed by the server before `subscribe()` resolves
//! - **Auto-Reconnection**: exponential backoff after unexpected closes, with
//!   automatic replay of confirmed subscriptions
//! - **Keep-alive**: periodic `ping` frames while the channel is open
//! - **Event listeners**: synchronous callbacks per event kind, isolated from
//!   each other's panics
//! - **Observability**: `tracing` spans and events plus optional
//!   OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use beacon_client::EventsClient;
//! use beacon_core::SubscribeOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EventsClient::builder("https://api.example.com")
//!         .token("secret")
//!         .build()?;
//!
//!     client.on_notification(|n| {
//!         println!("{}.{} {}: {:?}", n.domain, n.resource, n.event, n.resource_id);
//!     });
//!     client.on_reconnecting(|attempt, delay| {
//!         println!("Reconnect attempt {} in {:?}", attempt, delay);
//!     });
//!
//!     client.connect().await?;
//!     client
//!         .subscribe("apps", "deployment", SubscribeOptions::new().include_data(true))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Reconnection
//!
//! ```rust,no_run
//! use beacon_client::{EventsClient, FixedDelay};
//! use std::time::Duration;
//!
//! # fn example() -> beacon_core::Result<()> {
//! let client = EventsClient::builder("http://localhost:8080")
//!     .token("secret")
//!     .with_reconnect(Box::new(
//!         FixedDelay::new(Duration::from_secs(2)).with_max_attempts(20),
//!     ))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod connection;
mod connection_state;
mod dispatcher;
mod metrics;
mod reconnect;
mod subscription;

pub use client::EventsClient;
pub use client_builder::{
    events_url, EventsClientBuilder, EventsConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_PING_INTERVAL,
    DEFAULT_RECONNECT_DELAY, DEFAULT_SUBSCRIBE_TIMEOUT, EVENTS_PATH,
};
pub use connection_state::ConnectionState;
pub use dispatcher::{DisconnectReason, Event, EventDispatcher, EventKind, Listener, ListenerId};
pub use metrics::ClientMetrics;
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
