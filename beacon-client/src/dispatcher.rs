//! Event dispatch for the events channel
//!
//! Everything the connection observes is surfaced as an [`Event`] and
//! delivered to the listeners registered for its [`EventKind`].
//!
//! # Delivery
//!
//! - Listeners run synchronously on the connection task, in registration
//!   order
//! - The registry lock is released before any listener runs, so a listener
//!   may register or remove listeners (changes apply to the next event)
//! - A panicking listener is logged and skipped; the remaining listeners
//!   still receive the event
//!
//! Listeners should return quickly: the connection task does not read the
//! socket while they run. Hand heavy work off to a channel or a spawned task.
//!
//! # Examples
//!
//! ```rust
//! use beacon_client::{Event, EventDispatcher, EventKind};
//!
//! let dispatcher = EventDispatcher::new();
//! let id = dispatcher.on(EventKind::Error, |event| {
//!     if let Event::Error(e) = event {
//!         eprintln!("events channel error: {}", e);
//!     }
//! });
//!
//! assert_eq!(dispatcher.listener_count(EventKind::Error), 1);
//! assert!(dispatcher.off(id));
//! ```

use beacon_core::{ConnectAck, Error, Notification, Subscription, SystemNotification};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Kinds of events a listener can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Notification,
    SystemNotification,
    Error,
    SubscriptionConfirmed,
    Reconnecting,
}

impl EventKind {
    /// Stable label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Notification => "notification",
            EventKind::SystemNotification => "system_notification",
            EventKind::Error => "error",
            EventKind::SubscriptionConfirmed => "subscription_confirmed",
            EventKind::Reconnecting => "reconnecting",
        }
    }
}

/// Why the connection went down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// WebSocket close code, when one was exchanged
    pub code: Option<u16>,
    /// Close reason or a description of the failure
    pub reason: String,
    /// True when the client asked for the disconnect
    pub voluntary: bool,
}

/// An event observed on the events channel
#[derive(Debug, Clone)]
pub enum Event {
    /// Authentication succeeded
    Connect(ConnectAck),
    /// The connection went down
    Disconnect(DisconnectReason),
    /// Notification for one of the client's subscriptions
    Notification(Notification),
    /// Platform-wide notification
    SystemNotification(SystemNotification),
    /// Asynchronous error with no caller to report it to
    Error(Error),
    /// The server confirmed a subscription
    SubscriptionConfirmed(Subscription),
    /// A reconnect attempt has been scheduled
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
        /// Delay before the attempt starts
        delay: Duration,
    },
}

impl Event {
    /// The kind used for listener routing
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect(_) => EventKind::Connect,
            Event::Disconnect(_) => EventKind::Disconnect,
            Event::Notification(_) => EventKind::Notification,
            Event::SystemNotification(_) => EventKind::SystemNotification,
            Event::Error(_) => EventKind::Error,
            Event::SubscriptionConfirmed(_) => EventKind::SubscriptionConfirmed,
            Event::Reconnecting { .. } => EventKind::Reconnecting,
        }
    }
}

/// Type for listener functions
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventDispatcher::on`], used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    // Ordered by id, i.e. by registration
    entries: BTreeMap<ListenerId, (EventKind, Listener)>,
}

/// Registry of event listeners
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    // Listeners never run under the lock, so a poisoned map is still consistent
    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener for one kind of event
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut listeners = self.lock();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.insert(id, (kind, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was already gone
    pub fn off(&self, id: ListenerId) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of listeners registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Deliver an event to its listeners, returning how many completed
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .lock()
            .entries
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut delivered = 0;
        for listener in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(event = kind.as_str(), panic = %message, "Listener panicked");
                }
            }
        }
        delivered
    }

    /// Listen for successful authentication
    pub fn on_connect<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ConnectAck) + Send + Sync + 'static,
    {
        self.on(EventKind::Connect, move |event| {
            if let Event::Connect(ack) = event {
                f(ack)
            }
        })
    }

    /// Listen for connection loss
    pub fn on_disconnect<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.on(EventKind::Disconnect, move |event| {
            if let Event::Disconnect(reason) = event {
                f(reason)
            }
        })
    }

    /// Listen for subscription notifications
    pub fn on_notification<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.on(EventKind::Notification, move |event| {
            if let Event::Notification(notification) = event {
                f(notification)
            }
        })
    }

    /// Listen for system notifications
    pub fn on_system_notification<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&SystemNotification) + Send + Sync + 'static,
    {
        self.on(EventKind::SystemNotification, move |event| {
            if let Event::SystemNotification(notification) = event {
                f(notification)
            }
        })
    }

    /// Listen for asynchronous errors
    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, move |event| {
            if let Event::Error(error) = event {
                f(error)
            }
        })
    }

    /// Listen for subscription confirmations
    pub fn on_subscription_confirmed<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Subscription) + Send + Sync + 'static,
    {
        self.on(EventKind::SubscriptionConfirmed, move |event| {
            if let Event::SubscriptionConfirmed(subscription) = event {
                f(subscription)
            }
        })
    }

    /// Listen for scheduled reconnect attempts
    pub fn on_reconnecting<F>(&self, f: F) -> ListenerId
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.on(EventKind::Reconnecting, move |event| {
            if let Event::Reconnecting { attempt, delay } = event {
                f(*attempt, *delay)
            }
        })
    }
}
