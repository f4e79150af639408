//! Subscription tracking for the events channel
//!
//! Two tables are kept side by side:
//!
//! - **pending**: subscribe requests written to the socket and waiting for a
//!   `subscription_confirmed` frame, each with its own deadline
//! - **active**: confirmed subscriptions together with the request that
//!   created them, replayed after every reconnection
//!
//! # Request Lifecycle
//!
//! 1. **Generate ID**: unique among pending and active entries
//! 2. **Register**: store the waiter and the deadline
//! 3. **Send**: the connection manager writes the `subscribe` frame
//! 4. **Confirm**: matching confirmation moves the entry to the active table
//!    and settles the waiter with the server's view of the subscription
//! 5. **Expire / fail**: deadline or connection loss settles the waiter with
//!    an error
//!
//! A waiter is consumed when its entry leaves the pending table, so every
//! request is settled exactly once.
//!
//! The registry is owned by the connection task and never shared, which is
//! why it has no interior locking.

use beacon_core::{Error, Result, SubscribeOptions, Subscription, SubscriptionConfirmation};
use rand::Rng;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Who is waiting on a subscribe request
pub(crate) enum Waiter {
    /// A `subscribe()` caller
    Caller(oneshot::Sender<Result<Subscription>>),
    /// Replay after reconnection; outcomes are only logged
    Replay,
}

impl Waiter {
    fn settle(self, id: &str, result: Result<Subscription>) {
        match self {
            Waiter::Caller(tx) => {
                let _ = tx.send(result);
            }
            Waiter::Replay => match result {
                Ok(_) => tracing::debug!(subscription_id = %id, "Subscription restored"),
                Err(e) => tracing::warn!(
                    subscription_id = %id,
                    error = %e,
                    "Failed to restore subscription"
                ),
            },
        }
    }
}

/// Original request parameters, kept for replay
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubscriptionRequest {
    pub domain: String,
    pub resource: String,
    pub options: SubscribeOptions,
}

struct PendingSubscription {
    request: SubscriptionRequest,
    deadline: Instant,
    waiter: Waiter,
}

struct ActiveSubscription {
    subscription: Subscription,
    request: SubscriptionRequest,
}

/// Pending and confirmed subscriptions of one client
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    pending: HashMap<String, PendingSubscription>,
    active: HashMap<String, ActiveSubscription>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Generate a subscription ID of the form `sub_<millis>_<random>`
    ///
    /// The ID is also the key the server files the subscription under: it is
    /// echoed in `subscription_confirmed` and sent again unchanged when the
    /// subscription is replayed after a reconnection.
    pub(crate) fn generate_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut rng = rand::thread_rng();

        loop {
            let id = format!("sub_{}_{:08x}", millis, rng.gen::<u32>());
            if !self.contains(&id) {
                return id;
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id) || self.active.contains_key(id)
    }

    /// Register a request that has been (or is about to be) sent
    pub(crate) fn register(
        &mut self,
        id: String,
        request: SubscriptionRequest,
        deadline: Instant,
        waiter: Waiter,
    ) {
        self.pending.insert(
            id,
            PendingSubscription {
                request,
                deadline,
                waiter,
            },
        );
    }

    /// Apply a confirmation from the server
    ///
    /// Returns the confirmed subscription when it matched a pending request.
    /// Confirmations nobody is waiting for (late or foreign) leave the tables
    /// untouched.
    pub(crate) fn confirm(&mut self, confirmation: SubscriptionConfirmation) -> Option<Subscription> {
        let pending = self.pending.remove(&confirmation.subscription_id)?;
        let subscription = Subscription::from(confirmation);

        self.active.insert(
            subscription.id.clone(),
            ActiveSubscription {
                subscription: subscription.clone(),
                request: pending.request,
            },
        );
        pending.waiter.settle(&subscription.id, Ok(subscription.clone()));

        Some(subscription)
    }

    /// Fail one pending request
    pub(crate) fn fail(&mut self, id: &str, error: Error) {
        if let Some(pending) = self.pending.remove(id) {
            pending.waiter.settle(id, Err(error));
        }
    }

    /// Fail every pending request
    ///
    /// Replays interrupted this way go back to the active table so that the
    /// next authentication tries them again.
    pub(crate) fn fail_all_pending(&mut self, error: Error) {
        for (id, pending) in std::mem::take(&mut self.pending) {
            match pending.waiter {
                Waiter::Replay => {
                    let subscription = Subscription {
                        id: id.clone(),
                        domain: pending.request.domain.clone(),
                        resource: pending.request.resource.clone(),
                        filters: pending.request.options.filters.clone(),
                    };
                    self.active.insert(
                        id,
                        ActiveSubscription {
                            subscription,
                            request: pending.request,
                        },
                    );
                }
                waiter => waiter.settle(&id, Err(error.clone())),
            }
        }
    }

    /// Settle every request whose deadline has passed, returning their IDs
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.fail(id, Error::SubscriptionTimeout);
        }
        expired
    }

    /// Earliest pending deadline
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    /// Drop a confirmed subscription
    pub(crate) fn remove_active(&mut self, id: &str) -> bool {
        self.active.remove(id).is_some()
    }

    /// Withdraw a request that is still waiting for its confirmation
    ///
    /// A caller is told the connection closed on it; a replay is dropped
    /// silently. A confirmation arriving later no longer matches anything.
    pub(crate) fn cancel_pending(&mut self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some(pending) => {
                if let Waiter::Caller(tx) = pending.waiter {
                    let _ = tx.send(Err(Error::ConnectionClosed));
                }
                true
            }
            None => false,
        }
    }

    /// Empty the active table, returning what it held for replay
    pub(crate) fn take_for_replay(&mut self) -> Vec<(String, SubscriptionRequest)> {
        self.active
            .drain()
            .map(|(id, active)| (id, active.request))
            .collect()
    }

    /// Forget every confirmed subscription
    pub(crate) fn clear_active(&mut self) {
        self.active.clear();
    }

    /// Confirmed subscriptions
    pub(crate) fn snapshot(&self) -> Vec<Subscription> {
        self.active
            .values()
            .map(|active| active.subscription.clone())
            .collect()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }
}
