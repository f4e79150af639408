//! Beacon - client SDK for the platform's REST API and events channel
//!
//! This is the main convenience crate that re-exports all beacon sub-crates
//! and ties the two halves together behind one configuration.
//!
//! # Architecture
//!
//! - **beacon-core**: Wire frames, domain types, codec, errors, observability
//! - **beacon-client**: Real-time events channel over WebSocket
//! - **beacon-api**: JSend HTTP transport and REST modules
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use beacon::{Beacon, BeaconConfig, SubscribeOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let beacon = Beacon::new(
//!         BeaconConfig::new("https://api.example.com")
//!             .app_id("dashboard")
//!             .token("secret"),
//!     )?;
//!
//!     let me = beacon.api().users().me().await?;
//!     println!("Signed in as {}", me.id);
//!
//!     beacon.events().on_notification(|n| println!("{} {}", n.event, n.resource));
//!     beacon.events().connect().await?;
//!     beacon
//!         .events()
//!         .subscribe("apps", "deployment", SubscribeOptions::new())
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     beacon.events().disconnect().await;
//!     Ok(())
//! }
//! ```

pub use beacon_api as api;
pub use beacon_client as client;
pub use beacon_core as core;

pub use beacon_api::{ApiClient, ApiConfig};
pub use beacon_client::{EventsClient, EventsClientBuilder, EventsConfig};
pub use beacon_core::{Error, Result, SubscribeOptions, Subscription};

use std::fmt;

/// Settings shared by the REST client and the events channel
#[derive(Clone)]
pub struct BeaconConfig {
    pub base_url: String,
    pub app_id: Option<String>,
    pub token: Option<String>,
}

impl BeaconConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: None,
            token: None,
        }
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Transport configuration derived from these settings
    pub fn api_config(&self) -> ApiConfig {
        let mut config = ApiConfig::new(self.base_url.clone());
        config.app_id = self.app_id.clone();
        config.token = self.token.clone();
        config
    }

    /// Events channel builder derived from these settings
    pub fn events_builder(&self) -> EventsClientBuilder {
        let builder = EventsClient::builder(self.base_url.clone());
        match self.token {
            Some(ref token) => builder.token(token.clone()),
            None => builder,
        }
    }
}

impl fmt::Debug for BeaconConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeaconConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// REST client and events channel built from one configuration
#[derive(Clone)]
pub struct Beacon {
    api: ApiClient,
    events: EventsClient,
}

impl Beacon {
    /// Build both clients with default events settings
    ///
    /// Must be called inside a Tokio runtime (the events channel spawns its
    /// connection task).
    pub fn new(config: BeaconConfig) -> Result<Self> {
        Self::with_events(config, |builder| builder)
    }

    /// Build both clients, adjusting the events channel builder first
    pub fn with_events<F>(config: BeaconConfig, configure: F) -> Result<Self>
    where
        F: FnOnce(EventsClientBuilder) -> EventsClientBuilder,
    {
        let api = ApiClient::new(config.api_config())?;
        let events = configure(config.events_builder()).build()?;
        tracing::debug!(?config, endpoint = events.endpoint(), "Beacon SDK initialized");
        Ok(Self { api, events })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn events(&self) -> &EventsClient {
        &self.events
    }

    /// Install a new bearer token on both clients
    ///
    /// The events channel uses it from its next handshake on.
    pub fn set_bearer_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.api.set_bearer_token(token.clone());
        self.events.set_bearer_token(token);
    }

    pub fn clear_bearer_token(&self) {
        self.api.clear_bearer_token();
        self.events.clear_bearer_token();
    }
}
