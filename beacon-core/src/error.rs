//! Error types for beacon
//!
//! This module provides the single error type shared by every beacon crate.
//! It covers three families of failure:
//!
//! - **Events channel errors**: connection lifecycle, authentication handshake,
//!   subscription bookkeeping and reconnection
//! - **Transport errors**: socket or HTTP failures below the protocol
//! - **API errors**: typed errors decoded from JSend envelopes or non-2xx
//!   HTTP responses
//!
//! `Error` is `Clone`: one failure may settle several pending subscriptions
//! and reach every `error` listener. Library errors are stored as strings.
//!
//! # Examples
//!
//! ```rust
//! use beacon_core::{ApiError, Error};
//!
//! let error = Error::Api(ApiError::new(404, "not_found", "App not found"));
//! assert!(error.to_string().contains("404"));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for beacon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for beacon operations
///
/// # Error Categories
///
/// - **Connection errors**: AlreadyConnected, ConnectionInProgress,
///   NotConnected, ConnectionClosed, MaxReconnectAttemptsExceeded
/// - **Authentication errors**: MissingCredential, AuthenticationFailed
/// - **Timing errors**: Timeout, SubscriptionTimeout
/// - **Transport errors**: Transport, Http, InvalidUrl
/// - **Remote errors**: Server, Api
/// - **Processing errors**: Serialization
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// `connect()` was called while the channel is already open
    #[error("Already connected")]
    AlreadyConnected,

    /// `connect()` was called while another attempt is still in flight
    ///
    /// Only one connection attempt may be outstanding per client instance.
    #[error("Connection attempt already in progress")]
    ConnectionInProgress,

    /// No bearer token was available for the authentication handshake
    ///
    /// The socket is closed with the policy-violation code (1008) and no
    /// frame is written.
    #[error("Missing bearer token")]
    MissingCredential,

    /// The server rejected the authentication frame
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No connection acknowledgement arrived within the connect window
    #[error("Connection timeout")]
    Timeout,

    /// The operation requires an open, authenticated channel
    #[error("Not connected")]
    NotConnected,

    /// The server did not confirm a subscription within the subscribe window
    #[error("Subscription timeout")]
    SubscriptionTimeout,

    /// The connection closed before the operation could complete
    #[error("Connection closed")]
    ConnectionClosed,

    /// Socket-level failure (wraps the underlying WebSocket error)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Automatic reconnection gave up
    ///
    /// This is terminal: no further retries are scheduled until `connect()`
    /// is called again.
    #[error("Max reconnect attempts exceeded ({attempts})")]
    MaxReconnectAttemptsExceeded {
        /// Number of attempts that were made
        attempts: u32,
    },

    /// Error frame pushed by the server over the events channel
    #[error("Server error: {message}")]
    Server {
        /// Human-readable message from the server
        message: String,
        /// Optional machine-readable error code
        code: Option<String>,
    },

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A base URL could not be turned into an endpoint
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP request could not be performed (DNS, TLS, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Typed API error decoded from the server's response
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl Error {
    /// Short, stable label for this error kind
    ///
    /// Used as a metric attribute and in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AlreadyConnected => "already_connected",
            Error::ConnectionInProgress => "connection_in_progress",
            Error::MissingCredential => "missing_credential",
            Error::AuthenticationFailed(_) => "authentication_failed",
            Error::Timeout => "timeout",
            Error::NotConnected => "not_connected",
            Error::SubscriptionTimeout => "subscription_timeout",
            Error::ConnectionClosed => "connection_closed",
            Error::Transport(_) => "transport",
            Error::MaxReconnectAttemptsExceeded { .. } => "max_reconnect_attempts_exceeded",
            Error::Server { .. } => "server",
            Error::Serialization(_) => "serialization",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Http(_) => "http",
            Error::Api(_) => "api",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Typed API error raised by the HTTP transport
///
/// Produced for JSend `fail` / `error` envelopes and for non-2xx responses
/// that carry no envelope at all. The original server payload is kept so
/// callers can inspect validation details.
///
/// # Examples
///
/// ```rust
/// use beacon_core::ApiError;
///
/// let error = ApiError::new(401, "unauthorized", "Token expired");
/// assert!(error.is_unauthorized());
/// assert_eq!(error.to_string(), "401 unauthorized: Token expired");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    /// HTTP status code of the response
    pub status: u16,
    /// Error code reported by the server, or a derived fallback
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Original server payload (`null` when the body was empty)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ApiError {
    /// Create an API error without a payload
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attach the original server payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Whether the server rejected the credentials (HTTP 401)
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Whether the requested resource does not exist (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_from_serde() {
        let serde_error = serde_json::from_str::<serde_json::Value>(r#"{"invalid": json"#).unwrap_err();
        let error: Error = serde_error.into();

        match error {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            other => panic!("Expected Serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_api_error_display() {
        let error = ApiError::new(422, "validation_failed", "Name is required");
        assert_eq!(error.to_string(), "422 validation_failed: Name is required");

        let wrapped = Error::from(error);
        assert!(wrapped.to_string().contains("validation_failed"));
    }

    #[test]
    fn test_api_error_payload() {
        let error = ApiError::new(400, "fail", "Bad request")
            .with_payload(json!({"fields": {"name": "required"}}));

        assert_eq!(error.payload["fields"]["name"], "required");
        assert!(!error.is_unauthorized());
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_api_error_status_helpers() {
        assert!(ApiError::new(401, "unauthorized", "x").is_unauthorized());
        assert!(ApiError::new(404, "not_found", "x").is_not_found());
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = vec![
            Error::AlreadyConnected,
            Error::ConnectionInProgress,
            Error::MissingCredential,
            Error::AuthenticationFailed("bad token".into()),
            Error::Timeout,
            Error::NotConnected,
            Error::SubscriptionTimeout,
            Error::ConnectionClosed,
            Error::Transport("reset".into()),
            Error::MaxReconnectAttemptsExceeded { attempts: 3 },
        ];

        let mut kinds: Vec<&str> = errors.iter().map(Error::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_server_error_display() {
        let error = Error::Server {
            message: "rate limited".into(),
            code: Some("RATE_LIMIT".into()),
        };
        assert_eq!(error.to_string(), "Server error: rate limited");
    }

    #[test]
    fn test_max_reconnect_display() {
        let error = Error::MaxReconnectAttemptsExceeded { attempts: 5 };
        assert!(error.to_string().contains('5'));
    }

    #[test]
    fn test_api_error_roundtrip_keeps_payload() {
        let json = r#"{"status":403,"code":"forbidden","message":"nope","payload":{"scope":"apps"}}"#;
        let error: ApiError = serde_json::from_str(json).unwrap();
        assert_eq!(error.status, 403);
        assert_eq!(error.payload, json!({"scope": "apps"}));
    }
}
