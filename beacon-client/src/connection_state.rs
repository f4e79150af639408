//! Connection state management
//!
//! This module tracks the events socket lifecycle and the attempt counter
//! used for automatic reconnection.
//!
//! # Connection States
//!
//! - **Disconnected**: no socket (initial state, after a close, while waiting
//!   for a reconnect timer)
//! - **Connecting**: socket establishment in progress
//! - **Authenticating**: socket open, `auth` frame sent, waiting for `connected`
//! - **Open**: authenticated and operational
//! - **Closing**: a client-initiated close is in flight
//!
//! # State Transitions
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Open → Closing → Disconnected
//!       ↑             ↓              ↓          ↓
//!       └─────────────┴──────────────┴──────────┘  (failure / server close)
//! ```
//!
//! # Reconnection Logic
//!
//! When an open connection drops without a client-initiated close:
//! 1. Advance the attempt counter
//! 2. Consult the [`ReconnectionStrategy`] for the delay
//! 3. Wait the specified duration, then connect again
//! 4. On authentication: reset the counter and replay subscriptions
//! 5. On failure: repeat from step 1, or give up when the strategy says so

use crate::reconnect::ReconnectionStrategy;
use std::fmt;
use std::time::Duration;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Establishing the socket
    Connecting,
    /// Socket open, waiting for the server to accept the credential
    Authenticating,
    /// Authenticated and operational
    Open,
    /// Client-initiated close in progress
    Closing,
}

impl ConnectionState {
    /// Whether frames other than `auth` may be sent
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether a connection attempt is under way
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating
        )
    }

    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }

    /// Numeric encoding for the state gauge
    pub(crate) fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Authenticating => 2,
            ConnectionState::Open => 3,
            ConnectionState::Closing => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt counter paired with the strategy that prices each attempt
pub(crate) struct ReconnectState {
    attempt: u32,
    strategy: Box<dyn ReconnectionStrategy>,
}

impl ReconnectState {
    pub(crate) fn new(strategy: Box<dyn ReconnectionStrategy>) -> Self {
        Self {
            attempt: 0,
            strategy,
        }
    }

    /// Attempts made since the last successful authentication
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance to the next attempt
    ///
    /// Returns the attempt number and its delay, or `None` when the strategy
    /// gives up. The counter is left untouched when giving up.
    pub(crate) fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        let next = self.attempt.saturating_add(1);
        let delay = self.strategy.next_delay(next)?;
        self.attempt = next;
        Some((next, delay))
    }

    /// Reset the counter, returning the number of attempts it held
    pub(crate) fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.attempt)
    }
}
