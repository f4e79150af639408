//! Client builder and configuration for the events channel
//!
//! The `EventsClientBuilder` provides a fluent API over [`EventsConfig`]:
//! - Bearer token used for the in-band authentication frame
//! - Automatic reconnection (on by default) and its backoff
//! - Keep-alive, connect and subscribe windows
//! - Observability (OpenTelemetry metrics)
//!
//! Building does not open a socket; call [`EventsClient::connect`] when ready.
//!
//! # Examples
//!
//! ```rust,no_run
//! use beacon_client::EventsClient;
//! use std::time::Duration;
//!
//! # async fn example() -> beacon_core::Result<()> {
//! let client = EventsClient::builder("https://api.example.com")
//!     .token("secret")
//!     .max_reconnect_attempts(10)
//!     .ping_interval(Duration::from_secs(15))
//!     .build()?;
//!
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::ConnectionManager;
use crate::connection_state::{ConnectionState, ReconnectState};
use crate::dispatcher::EventDispatcher;
use crate::metrics::ClientMetrics;
use crate::reconnect::{ExponentialBackoff, ReconnectionStrategy};
use crate::EventsClient;
use beacon_core::{Error, ObservabilityConfig, Result};
use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;

/// Path of the events socket relative to the API base URL
pub const EVENTS_PATH: &str = "/v1/events/ws";

/// Default maximum number of reconnect attempts
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default base reconnect delay
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Default cap on the reconnect delay
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Default keep-alive ping interval
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// Default window for socket establishment plus authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default window for a subscription confirmation
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of one events channel
#[derive(Clone)]
pub struct EventsConfig {
    /// HTTP(S) base URL of the API
    pub base_url: String,
    /// Bearer token for the authentication frame
    pub token: Option<String>,
    /// Reconnect automatically after an unexpected close
    pub auto_reconnect: bool,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt
    pub reconnect_delay: Duration,
    /// Upper bound for any reconnect delay
    pub max_reconnect_delay: Duration,
    /// Interval between keep-alive pings; zero disables them
    pub ping_interval: Duration,
    /// Window for socket establishment plus authentication
    pub connect_timeout: Duration,
    /// Window for a subscription confirmation
    pub subscribe_timeout: Duration,
}

impl EventsConfig {
    /// Configuration with default settings for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
        }
    }

    /// WebSocket endpoint derived from the base URL
    pub fn endpoint(&self) -> Result<String> {
        events_url(&self.base_url)
    }
}

impl fmt::Debug for EventsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventsConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("ping_interval", &self.ping_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .finish()
    }
}

/// Derive the events socket URL from an HTTP base URL
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss` base URLs are
/// accepted as-is. [`EVENTS_PATH`] is appended to the base path (trailing
/// slashes dropped); the query string is kept and the fragment removed.
///
/// ```rust
/// use beacon_client::events_url;
///
/// assert_eq!(
///     events_url("https://api.example.com/").unwrap(),
///     "wss://api.example.com/v1/events/ws"
/// );
/// assert!(events_url("ftp://example.com").is_err());
/// ```
pub fn events_url(base_url: &str) -> Result<String> {
    let mut url = Url::parse(base_url.trim())
        .map_err(|e| Error::InvalidUrl(format!("`{}`: {}", base_url, e)))?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme `{}` in `{}`",
                other, base_url
            )))
        }
    };
    if !url.has_host() {
        return Err(Error::InvalidUrl(format!("missing host in `{}`", base_url)));
    }

    url.set_scheme(ws_scheme)
        .map_err(|_| Error::InvalidUrl(format!("cannot use `{}` as a socket URL", base_url)))?;
    url.set_fragment(None);
    let path = format!("{}{}", url.path().trim_end_matches('/'), EVENTS_PATH);
    url.set_path(&path);

    Ok(url.to_string())
}

/// Builder for configuring and creating an [`EventsClient`]
pub struct EventsClientBuilder {
    config: EventsConfig,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    observability_config: Option<ObservabilityConfig>,
    enable_metrics: bool,
    service_name: Option<String>,
}

impl EventsClientBuilder {
    /// Create a new client builder
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(EventsConfig::new(base_url))
    }

    /// Start from an existing configuration
    pub fn from_config(config: EventsConfig) -> Self {
        Self {
            config,
            reconnect_strategy: None,
            observability_config: None,
            enable_metrics: false,
            service_name: None,
        }
    }

    /// Set the bearer token used to authenticate
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Enable or disable automatic reconnection (default: enabled)
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.config.auto_reconnect = enable;
        self
    }

    /// Maximum number of reconnect attempts before giving up
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Delay before the first reconnect attempt
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Upper bound for the reconnect delay
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay = delay;
        self
    }

    /// Replace the exponential backoff with a custom strategy
    ///
    /// The attempt and delay settings of the configuration are ignored when a
    /// custom strategy is set.
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self.config.auto_reconnect = true;
        self
    }

    /// Disable automatic reconnection
    pub fn without_reconnect(mut self) -> Self {
        self.config.auto_reconnect = false;
        self.reconnect_strategy = None;
        self
    }

    /// Interval between keep-alive pings (zero disables them)
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Window for socket establishment plus authentication
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Window for a subscription confirmation
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.config.subscribe_timeout = timeout;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self.enable_metrics = true;
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(self) -> Self {
        self.with_observability(ObservabilityConfig::default())
    }

    /// Record metrics through the already-installed global meter provider
    pub fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the client and spawn its connection task
    ///
    /// Must be called from within a Tokio runtime. No socket is opened until
    /// [`EventsClient::connect`] is called.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUrl` if the base URL cannot be turned into an events
    /// endpoint.
    pub fn build(self) -> Result<EventsClient> {
        let endpoint = self.config.endpoint()?;

        let mut service_name = self.service_name;
        if let Some(mut config) = self.observability_config {
            if let Some(name) = service_name.clone() {
                config.service_name = name;
            }
            service_name.get_or_insert_with(|| config.service_name.clone());

            // Another pipeline may already be installed by the application
            if let Err(e) = beacon_core::init_observability(config) {
                tracing::warn!(error = %e, "Observability not initialized");
            }
        }

        let metrics = self.enable_metrics.then(|| {
            Arc::new(ClientMetrics::new(
                service_name.unwrap_or_else(|| "beacon".to_string()),
            ))
        });

        let strategy = self.reconnect_strategy.unwrap_or_else(|| {
            Box::new(
                ExponentialBackoff::new(self.config.reconnect_delay, self.config.max_reconnect_delay)
                    .with_max_attempts(self.config.max_reconnect_attempts),
            )
        });

        let token = Arc::new(RwLock::new(self.config.token.clone()));
        let reconnect_attempts = Arc::new(AtomicU32::new(0));
        let dispatcher = EventDispatcher::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let manager = ConnectionManager::new(
            self.config,
            endpoint.clone(),
            command_rx,
            state_tx,
            Arc::clone(&token),
            dispatcher.clone(),
            ReconnectState::new(strategy),
            Arc::clone(&reconnect_attempts),
            metrics,
        );

        tracing::debug!(endpoint = %endpoint, "Spawning events connection task");
        tokio::spawn(manager.run());

        Ok(EventsClient {
            commands: command_tx,
            state: state_rx,
            token,
            dispatcher,
            reconnect_attempts,
            endpoint: endpoint.into(),
        })
    }
}
