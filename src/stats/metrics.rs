//! Statistics for the telemetry server and dashboard subscribers

use std::time::Duration;

use crate::relay::SubscriberId;

/// Per-subscriber delivery statistics
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberStats {
    pub id: SubscriberId,
    /// Events handed to the subscriber
    pub delivered: u64,
    /// Events lost because the subscriber fell behind
    pub dropped: u64,
    /// Publish index of the last delivered event
    pub cursor: Option<u64>,
    /// Time since the subscriber attached
    pub connected_for: Duration,
}

impl SubscriberStats {
    /// Fraction of events seen by this subscriber that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let seen = self.delivered + self.dropped;
        if seen > 0 {
            self.dropped as f64 / seen as f64
        } else {
            0.0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total ingest connections ever accepted
    pub total_connections: u64,
    /// Ingest connections currently open
    pub active_connections: u64,
    /// Live sessions (streaming or detached)
    pub active_sessions: u64,
    /// Attached dashboard subscribers
    pub active_subscribers: u64,
    /// Frames applied to session state
    pub frames_applied: u64,
    /// Frames dropped as out of order or incomplete
    pub frames_dropped: u64,
    /// Events published to the relay
    pub events_published: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applied frames per second over the server's uptime
    pub fn frame_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_applied as f64 / secs
        } else {
            0.0
        }
    }
}
