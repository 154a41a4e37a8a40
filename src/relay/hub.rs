//! Dashboard relay
//!
//! One producer (the ingest path) publishes events; any number of
//! subscribers receive a copy of every event published after they attached.
//!
//! Fan-out runs over a `tokio::sync::broadcast` channel. Each receiver has
//! its own cursor into the ring, so a subscriber that stops reading only
//! loses its own oldest events (reported as `Lagged`) while the producer and
//! the other subscribers carry on. Publishing never waits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::stats::SubscriberStats;

use super::error::RelayError;
use super::event::{Delivery, FrameEvent, RelayEvent, StatusEvent};
use super::subscription::Subscription;

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Identifier of an attached subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Events a subscriber may fall behind before it loses the oldest
    pub subscriber_capacity: usize,

    /// Maximum attached subscribers (0 = unlimited)
    pub max_subscribers: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            max_subscribers: 0,
        }
    }
}

impl RelayConfig {
    /// Set the per-subscriber queue depth (at least 1)
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Set the subscriber limit
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }
}

/// Bookkeeping for one attached subscriber
pub(super) struct SubscriberState {
    pub(super) id: SubscriberId,
    pub(super) subscribed_at: Instant,
    pub(super) delivered: AtomicU64,
    pub(super) dropped: AtomicU64,
    /// Publish index of the last delivered event + 1 (0 = nothing yet)
    pub(super) cursor: AtomicU64,
    /// Flipped to `true` on unsubscribe
    pub(super) closed: watch::Sender<bool>,
}

impl SubscriberState {
    fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            id: self.id,
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            cursor: self.cursor.load(Ordering::Relaxed).checked_sub(1),
            connected_for: self.subscribed_at.elapsed(),
        }
    }
}

pub(super) struct RelayShared {
    tx: broadcast::Sender<Delivery>,
    /// Next publish index; held across `send` so indices follow channel order
    next_index: Mutex<u64>,
    subscribers: Mutex<HashMap<SubscriberId, Arc<SubscriberState>>>,
    next_subscriber: AtomicU64,
    config: RelayConfig,
}

impl RelayShared {
    pub(super) fn remove(&self, id: SubscriberId) -> Option<Arc<SubscriberState>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

/// Fan-out hub between the ingest path and dashboard subscribers
///
/// Cheap to clone; clones share the same subscribers.
#[derive(Clone)]
pub struct DashboardRelay {
    shared: Arc<RelayShared>,
}

impl DashboardRelay {
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(config: RelayConfig) -> Self {
        let (tx, _) = broadcast::channel(config.subscriber_capacity.max(1));
        Self {
            shared: Arc::new(RelayShared {
                tx,
                next_index: Mutex::new(0),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    /// Publish an event to every attached subscriber
    ///
    /// Never blocks. Returns the number of subscribers the event was queued
    /// for.
    pub fn publish(&self, event: RelayEvent) -> usize {
        let event = Arc::new(event);
        let mut next_index = self
            .shared
            .next_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let index = *next_index;
        *next_index += 1;

        match self.shared.tx.send(Delivery { index, event }) {
            Ok(receivers) => receivers,
            // No subscribers attached
            Err(_) => 0,
        }
    }

    pub fn publish_frame(&self, frame: FrameEvent) -> usize {
        self.publish(RelayEvent::Frame(frame))
    }

    pub fn publish_status(&self, status: StatusEvent) -> usize {
        self.publish(RelayEvent::Status(status))
    }

    /// Total events published so far
    pub fn published(&self) -> u64 {
        *self
            .shared
            .next_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new subscriber
    ///
    /// The subscriber sees only events published after this call returns.
    pub fn subscribe(&self) -> Result<Subscription, RelayError> {
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let max = self.shared.config.max_subscribers;
        if max > 0 && subscribers.len() >= max {
            return Err(RelayError::SubscriberLimit(max));
        }

        let id = SubscriberId(self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let (closed, closed_rx) = watch::channel(false);
        let state = Arc::new(SubscriberState {
            id,
            subscribed_at: Instant::now(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            cursor: AtomicU64::new(0),
            closed,
        });
        subscribers.insert(id, Arc::clone(&state));
        let rx = self.shared.tx.subscribe();

        tracing::info!(
            subscriber = %id,
            subscribers = subscribers.len(),
            "Subscriber attached"
        );

        Ok(Subscription::new(
            state,
            rx,
            closed_rx,
            Arc::downgrade(&self.shared),
        ))
    }

    /// Detach a subscriber
    ///
    /// Safe while a delivery to the same subscriber is in flight; its
    /// pending `recv` returns `None`.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<(), RelayError> {
        let state = self
            .shared
            .remove(id)
            .ok_or(RelayError::UnknownSubscriber(id))?;

        state.closed.send_replace(true);

        tracing::info!(
            subscriber = %id,
            delivered = state.delivered.load(Ordering::Relaxed),
            dropped = state.dropped.load(Ordering::Relaxed),
            "Subscriber detached"
        );

        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivery statistics of every attached subscriber, ordered by id
    pub fn subscriber_stats(&self) -> Vec<SubscriberStats> {
        let subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut stats: Vec<_> = subscribers.values().map(|s| s.stats()).collect();
        stats.sort_by_key(|s| s.id);
        stats
    }
}

impl Default for DashboardRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::relay::ConnectionStatus;

    fn frame(sequence: u64) -> RelayEvent {
        RelayEvent::Frame(FrameEvent {
            session_id: "arm-1".into(),
            device_id: "arm".into(),
            robot_type: "so101_leader".into(),
            sequence,
            timestamp_ms: sequence * 33,
            angles: BTreeMap::new(),
            normalized: BTreeMap::new(),
        })
    }

    fn sequence_of(delivery: &Delivery) -> u64 {
        match delivery.event.as_ref() {
            RelayEvent::Frame(f) => f.sequence,
            RelayEvent::Status(_) => panic!("expected frame"),
        }
    }

    #[test]
    fn test_config_builder() {
        let config = RelayConfig::default()
            .subscriber_capacity(0)
            .max_subscribers(4);

        assert_eq!(config.subscriber_capacity, 1);
        assert_eq!(config.max_subscribers, 4);
        assert_eq!(RelayConfig::default().subscriber_capacity, 64);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let relay = DashboardRelay::new();
        assert_eq!(relay.publish(frame(1)), 0);
        assert_eq!(relay.published(), 1);
    }

    #[tokio::test]
    async fn test_no_backfill_for_late_subscriber() {
        let relay = DashboardRelay::new();
        let mut a = relay.subscribe().unwrap();

        for seq in 1..10 {
            relay.publish(frame(seq));
        }
        let mut b = relay.subscribe().unwrap();
        for seq in 10..13 {
            relay.publish(frame(seq));
        }

        let mut seen_a = Vec::new();
        while let Some(d) = a.try_recv() {
            seen_a.push(sequence_of(&d));
        }
        let mut seen_b = Vec::new();
        while let Some(d) = b.try_recv() {
            seen_b.push(sequence_of(&d));
        }

        assert_eq!(seen_a, (1..13).collect::<Vec<_>>());
        assert_eq!(seen_b, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_isolated() {
        let relay = DashboardRelay::with_config(RelayConfig::default().subscriber_capacity(4));
        let stalled = relay.subscribe().unwrap();
        let mut live = relay.subscribe().unwrap();

        for seq in 1..=20 {
            // Never waits even though `stalled` never reads
            assert_eq!(relay.publish(frame(seq)), 2);
            let d = live.recv().await.unwrap();
            assert_eq!(sequence_of(&d), seq);
        }

        assert_eq!(live.dropped(), 0);
        drop(stalled);
        assert_eq!(relay.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_oldest() {
        let relay = DashboardRelay::with_config(RelayConfig::default().subscriber_capacity(4));
        let mut sub = relay.subscribe().unwrap();

        for seq in 1..=10 {
            relay.publish(frame(seq));
        }

        let mut seen = Vec::new();
        while let Some(d) = sub.try_recv() {
            seen.push(sequence_of(&d));
        }

        // Only the newest events survive, still in publish order
        assert_eq!(seen, vec![7, 8, 9, 10]);
        assert_eq!(sub.dropped(), 6);

        let stats = relay.subscriber_stats();
        assert_eq!(stats[0].delivered, 4);
        assert_eq!(stats[0].dropped, 6);
        assert_eq!(stats[0].cursor, Some(9));
    }

    #[tokio::test]
    async fn test_unsubscribe_wakes_pending_recv() {
        let relay = DashboardRelay::new();
        let mut sub = relay.subscribe().unwrap();
        let id = sub.id();

        let mut recv = task::spawn(async move { sub.recv().await.map(|d| d.index) });
        assert_pending!(recv.poll());

        relay.unsubscribe(id).unwrap();
        assert!(recv.is_woken());
        assert_eq!(assert_ready!(recv.poll()), None);

        assert_eq!(relay.unsubscribe(id), Err(RelayError::UnknownSubscriber(id)));
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_relay_dropped() {
        let relay = DashboardRelay::new();
        let mut sub = relay.subscribe().unwrap();
        relay.publish_status(StatusEvent {
            session_id: "arm-1".into(),
            device_id: "arm".into(),
            status: ConnectionStatus::Connected,
        });
        drop(relay);

        let d = sub.recv().await.unwrap();
        assert_eq!(d.event.name(), "status");
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_subscriber_limit() {
        let relay = DashboardRelay::with_config(RelayConfig::default().max_subscribers(1));
        let first = relay.subscribe().unwrap();

        assert!(matches!(
            relay.subscribe(),
            Err(RelayError::SubscriberLimit(1))
        ));
        drop(first);
        assert!(relay.subscribe().is_ok());
    }
}
