//! Core types, codec and errors for the beacon SDK
//!
//! This crate provides the foundation shared by the events channel
//! (`beacon-client`) and the REST side (`beacon-api`):
//!
//! - **Types**: wire frames of the events channel and the domain types they
//!   carry (subscriptions, notifications, connection acknowledgements)
//! - **Codec**: JSON encoding of client frames and decoding of server frames
//! - **Error handling**: the single `Error` type used across the SDK,
//!   including the typed `ApiError` raised by the HTTP transport
//! - **Observability**: OpenTelemetry and `tracing` setup for applications
//!   embedding the SDK
//!
//! # Example
//!
//! ```rust
//! use beacon_core::{codec, ServerFrame};
//!
//! let frame = codec::decode(r#"{"type":"connected","user_id":"u1"}"#).unwrap();
//! match frame {
//!     ServerFrame::Connected(ack) => assert_eq!(ack.user_id, "u1"),
//!     _ => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{ApiError, Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    ClientFrame, ConnectAck, Filters, Notification, ServerFrame, SubscribeOptions, Subscription,
    SubscriptionConfirmation, SystemNotification,
};
