//! Events pushed to dashboard subscribers

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

/// Something a dashboard should render
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A frame was applied to a session
    Frame(FrameEvent),
    /// A session changed connection status
    Status(StatusEvent),
}

impl RelayEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::Frame(_) => "frame",
            RelayEvent::Status(_) => "status",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            RelayEvent::Frame(f) => &f.session_id,
            RelayEvent::Status(s) => &s.session_id,
        }
    }
}

/// Calibrated frame as presented to dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameEvent {
    pub session_id: String,
    pub device_id: String,
    pub robot_type: String,
    pub sequence: u64,
    pub timestamp_ms: u64,
    /// Angle per joint
    pub angles: BTreeMap<String, f64>,
    /// Angle per joint rescaled to `[0, 1]` within its bounds
    pub normalized: BTreeMap<String, f64>,
}

/// Session connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// A stream is attached
    Connected,
    /// Stream closed, session resumable until the idle timeout
    Disconnected,
    /// Session removed after the idle timeout
    Expired,
}

/// Connection status change of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub session_id: String,
    pub device_id: String,
    pub status: ConnectionStatus,
}

/// One published event with its position in the publish order
///
/// Cheap to clone: the event is shared between all subscribers.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Relay-wide publish index, strictly increasing
    pub index: u64,
    pub event: Arc<RelayEvent>,
}
