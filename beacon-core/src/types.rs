//! Wire frames and domain types for the events channel
//!
//! Every frame exchanged over the events socket is a JSON object carrying a
//! `type` discriminator. Both directions are modelled as internally tagged
//! enums so that routing is a plain `match` over known kinds:
//!
//! - [`ClientFrame`]: frames the SDK writes (`auth`, `subscribe`,
//!   `unsubscribe`, `ping`, `typing_event`)
//! - [`ServerFrame`]: frames the server pushes (`connected`, `auth_error`,
//!   `subscription_confirmed`, `unsubscribed`, `notification`,
//!   `system_notification`, `pong`, `error`), with an explicit
//!   [`ServerFrame::Unknown`] fallback for kinds this SDK does not know yet
//!
//! # Domains and resources
//!
//! Subscriptions use a two-level topic classifier: a `domain` (for example
//! `chat`) and a `resource` within it (for example `message`). Filters are a
//! free-form JSON object interpreted by the server.
//!
//! # Examples
//!
//! ```rust
//! use beacon_core::{ClientFrame, SubscribeOptions};
//! use serde_json::json;
//!
//! let frame = ClientFrame::Subscribe {
//!     subscription_id: "sub_1".into(),
//!     domain: "chat".into(),
//!     resource: "message".into(),
//!     options: SubscribeOptions::new().filter("chat_ids", json!(["c1"])),
//! };
//!
//! let value = serde_json::to_value(&frame).unwrap();
//! assert_eq!(value["type"], "subscribe");
//! assert_eq!(value["options"]["filters"]["chat_ids"][0], "c1");
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Subscription filters, interpreted by the server
pub type Filters = Map<String, Value>;

/// Frames sent from the client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// First frame after the socket opens, carrying the bearer token
    Auth {
        /// Bearer token for this handshake
        token: String,
    },

    /// Request a subscription to a domain/resource pair
    Subscribe {
        /// Locally generated identifier, echoed back on confirmation
        subscription_id: String,
        /// Topic domain (e.g. `chat`)
        domain: String,
        /// Resource within the domain (e.g. `message`)
        resource: String,
        /// Filters and delivery options
        options: SubscribeOptions,
    },

    /// Drop a subscription (fire-and-forget)
    Unsubscribe {
        /// Identifier of the subscription to drop
        subscription_id: String,
    },

    /// Keep-alive ping; the server answers with `pong`
    Ping,

    /// Typing indicator for a chat (fire-and-forget)
    TypingEvent {
        /// Chat the indicator applies to
        chat_id: String,
        /// Indicator kind, e.g. `start` or `stop`
        event: String,
    },
}

impl ClientFrame {
    /// The wire `type` of this frame
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Auth { .. } => "auth",
            ClientFrame::Subscribe { .. } => "subscribe",
            ClientFrame::Unsubscribe { .. } => "unsubscribe",
            ClientFrame::Ping => "ping",
            ClientFrame::TypingEvent { .. } => "typing_event",
        }
    }
}

/// Frames pushed by the server to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Authentication succeeded; the channel is open
    Connected(ConnectAck),

    /// Authentication was rejected
    AuthError {
        /// Reason given by the server
        #[serde(default)]
        error: String,
    },

    /// A subscription request was accepted
    SubscriptionConfirmed(SubscriptionConfirmation),

    /// The server dropped a subscription
    Unsubscribed {
        /// Identifier of the dropped subscription
        subscription_id: String,
    },

    /// Event matching one of this client's subscriptions
    Notification(Notification),

    /// Platform-wide event delivered to every connection of the user
    SystemNotification(SystemNotification),

    /// Answer to a keep-alive ping
    Pong {},

    /// Error reported by the server outside any request
    Error {
        /// Human-readable message
        #[serde(default)]
        message: String,
        /// Optional error code (numeric codes are kept as strings)
        #[serde(default, deserialize_with = "string_or_number")]
        code: Option<String>,
    },

    /// Any frame type this client does not recognize
    #[serde(other)]
    Unknown,
}

/// Payload of the `connected` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectAck {
    /// Authenticated user
    pub user_id: String,
    /// Optional greeting from the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// System subscriptions granted implicitly by the server
    #[serde(default, deserialize_with = "null_as_default")]
    pub system_subscriptions: Vec<Value>,
}

/// Payload of the `subscription_confirmed` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfirmation {
    /// Identifier the confirmation applies to
    pub subscription_id: String,
    /// Confirmed domain
    pub domain: String,
    /// Confirmed resource
    pub resource: String,
    /// Filters as accepted by the server (may differ from the request)
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Filters,
}

impl From<SubscriptionConfirmation> for Subscription {
    fn from(confirmation: SubscriptionConfirmation) -> Self {
        Subscription {
            id: confirmation.subscription_id,
            domain: confirmation.domain,
            resource: confirmation.resource,
            filters: confirmation.filters,
        }
    }
}

/// A server-confirmed subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier
    pub id: String,
    /// Topic domain
    pub domain: String,
    /// Resource within the domain
    pub resource: String,
    /// Filters accepted by the server
    #[serde(default)]
    pub filters: Filters,
}

/// Options sent along with a subscribe request
///
/// Serializes as `{"filters": {...}, "include_data": bool}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Server-side filters for the subscription
    #[serde(default)]
    pub filters: Filters,
    /// Ask the server to embed the full resource in each notification
    #[serde(default)]
    pub include_data: bool,
}

impl SubscribeOptions {
    /// Options with no filters and `include_data = false`
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single filter entry
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Replace all filters at once
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Toggle embedding of resource data in notifications
    pub fn include_data(mut self, include: bool) -> Self {
        self.include_data = include;
        self
    }
}

/// Payload of the `notification` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Subscription that matched this event
    #[serde(default)]
    pub subscription_id: String,
    /// Topic domain
    pub domain: String,
    /// Resource within the domain
    pub resource: String,
    /// Event name, e.g. `created`
    pub event: String,
    /// Identifier of the affected resource
    #[serde(default, deserialize_with = "string_or_number")]
    pub resource_id: Option<String>,
    /// Server timestamp of the event
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp: Option<String>,
    /// Every other field the server attached
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Payload of the `system_notification` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotification {
    /// Event name
    pub event: String,
    /// Topic domain
    #[serde(default)]
    pub domain: String,
    /// Resource within the domain
    #[serde(default)]
    pub resource: String,
    /// Optional action hint for the UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Optional human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Every other field the server attached
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Servers are not consistent about ids and codes: accept both 42 and "42".
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
