//! Client metrics definitions
//!
//! OpenTelemetry instruments describing the health of an events channel.
//! They are exported through whatever global meter provider the application
//! installed (see `beacon_core::init_observability`).
//!
//! # Metrics Collected
//!
//! - **connection.state**: current connection state (gauge)
//! - **reconnection.attempts**: reconnect attempts started (counter)
//! - **reconnection.success**: reconnects that authenticated (counter)
//! - **notifications.received**: notifications by domain (counter)
//! - **subscriptions.confirmed**: confirmed subscriptions (counter)
//! - **subscriptions.timeouts**: subscribe requests that timed out (counter)
//! - **frames.sent**: frames written by frame type (counter)
//! - **errors.total**: errors by kind (counter)
//!
//! # Usage
//!
//! Metrics are recorded automatically when enabled via
//! `EventsClientBuilder::with_observability()` or `with_metrics()`.

use crate::connection_state::ConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Connection state (0=disconnected, 1=connecting, 2=authenticating, 3=open, 4=closing)
    pub connection_state: Gauge<i64>,
    /// Total number of reconnection attempts
    pub reconnection_attempts: Counter<u64>,
    /// Total number of successful reconnections
    pub reconnection_success: Counter<u64>,
    /// Total number of notifications received
    pub notifications_received: Counter<u64>,
    /// Total number of confirmed subscriptions
    pub subscriptions_confirmed: Counter<u64>,
    /// Total number of subscribe requests that timed out
    pub subscription_timeouts: Counter<u64>,
    /// Total number of frames written to the socket
    pub frames_sent: Counter<u64>,
    /// Total number of errors
    pub errors_total: Counter<u64>,
}

impl ClientMetrics {
    /// Create a new ClientMetrics instance
    pub fn new(service_name: impl Into<String>) -> Self {
        let meter = global::meter_with_scope(
            opentelemetry::InstrumentationScope::builder(service_name.into()).build(),
        );
        Self::new_with_meter(&meter)
    }

    /// Create a new ClientMetrics instance with a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("beacon.events.connection.state")
                .with_description(
                    "Connection state (0=disconnected, 1=connecting, 2=authenticating, 3=open, 4=closing)",
                )
                .build(),
            reconnection_attempts: meter
                .u64_counter("beacon.events.reconnection.attempts")
                .with_description("Total number of reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("beacon.events.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
            notifications_received: meter
                .u64_counter("beacon.events.notifications.received")
                .with_description("Total number of notifications received")
                .build(),
            subscriptions_confirmed: meter
                .u64_counter("beacon.events.subscriptions.confirmed")
                .with_description("Total number of confirmed subscriptions")
                .build(),
            subscription_timeouts: meter
                .u64_counter("beacon.events.subscriptions.timeouts")
                .with_description("Total number of subscribe requests that timed out")
                .build(),
            frames_sent: meter
                .u64_counter("beacon.events.frames.sent")
                .with_description("Total number of frames written to the socket")
                .build(),
            errors_total: meter
                .u64_counter("beacon.events.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_gauge(), &[]);
    }

    /// Record a reconnection attempt
    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    /// Record a successful reconnection
    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    /// Record a notification received
    pub fn record_notification(&self, domain: &str) {
        let attributes = &[KeyValue::new("domain", domain.to_string())];
        self.notifications_received.add(1, attributes);
    }

    /// Record a subscription confirmation
    pub fn record_subscription_confirmed(&self, domain: &str) {
        let attributes = &[KeyValue::new("domain", domain.to_string())];
        self.subscriptions_confirmed.add(1, attributes);
    }

    /// Record a subscribe timeout
    pub fn record_subscription_timeout(&self) {
        self.subscription_timeouts.add(1, &[]);
    }

    /// Record a frame written to the socket
    pub fn record_frame_sent(&self, frame_type: &'static str) {
        let attributes = &[KeyValue::new("type", frame_type)];
        self.frames_sent.add(1, attributes);
    }

    /// Record an error
    pub fn record_error(&self, error_kind: &'static str) {
        let attributes = &[KeyValue::new("error_kind", error_kind)];
        self.errors_total.add(1, attributes);
    }
}
