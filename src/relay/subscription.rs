//! Subscriber side of the relay

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};

use super::event::Delivery;
use super::hub::{RelayShared, SubscriberId, SubscriberState};

/// One attached dashboard subscriber
///
/// Dropping the subscription detaches it from the relay.
pub struct Subscription {
    state: Arc<SubscriberState>,
    rx: broadcast::Receiver<Delivery>,
    closed: watch::Receiver<bool>,
    relay: Weak<RelayShared>,
}

impl Subscription {
    pub(super) fn new(
        state: Arc<SubscriberState>,
        rx: broadcast::Receiver<Delivery>,
        closed: watch::Receiver<bool>,
        relay: Weak<RelayShared>,
    ) -> Self {
        Self {
            state,
            rx,
            closed,
            relay,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.state.id
    }

    /// Events lost so far because this subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    /// Events delivered so far
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    /// Publish index of the last delivered event
    pub fn cursor(&self) -> Option<u64> {
        self.state.cursor.load(Ordering::Relaxed).checked_sub(1)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the subscriber is unsubscribed or the relay is
    /// gone. If the subscriber fell behind, the oldest missed events are
    /// skipped and counted in [`dropped`](Self::dropped).
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if *self.closed.borrow_and_update() {
                return None;
            }

            tokio::select! {
                biased;

                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                result = self.rx.recv() => match result {
                    Ok(delivery) => {
                        self.record(&delivery);
                        return Some(delivery);
                    }
                    Err(RecvError::Lagged(missed)) => self.record_lag(missed),
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Delivery> {
        if self.is_closed() {
            return None;
        }

        loop {
            match self.rx.try_recv() {
                Ok(delivery) => {
                    self.record(&delivery);
                    return Some(delivery);
                }
                Err(TryRecvError::Lagged(missed)) => self.record_lag(missed),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn record(&self, delivery: &Delivery) {
        self.state.delivered.fetch_add(1, Ordering::Relaxed);
        self.state.cursor.store(delivery.index + 1, Ordering::Relaxed);
    }

    fn record_lag(&self, missed: u64) {
        self.state.dropped.fetch_add(missed, Ordering::Relaxed);
        tracing::debug!(
            subscriber = %self.state.id,
            missed = missed,
            "Subscriber lagging, dropped oldest events"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.upgrade() {
            if relay.remove(self.state.id).is_some() {
                tracing::debug!(subscriber = %self.state.id, "Subscription dropped");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.state.id)
            .field("delivered", &self.delivered())
            .field("dropped", &self.dropped())
            .finish()
    }
}
