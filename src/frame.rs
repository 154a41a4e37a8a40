//! Raw and calibrated frame types
//!
//! A [`RawFrame`] lives for one sampling tick; a [`CalibratedFrame`] is the
//! unit carried on the wire.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One raw reading per joint, device units
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Time since the source started sampling
    pub captured_at: Duration,
    /// Raw value keyed by joint name
    pub values: BTreeMap<String, f64>,
}

impl RawFrame {
    /// Create an empty frame captured at `captured_at`
    pub fn new(captured_at: Duration) -> Self {
        Self {
            captured_at,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with_value(mut self, joint: impl Into<String>, raw: f64) -> Self {
        self.values.insert(joint.into(), raw);
        self
    }

    pub fn insert(&mut self, joint: impl Into<String>, raw: f64) {
        self.values.insert(joint.into(), raw);
    }

    pub fn get(&self, joint: &str) -> Option<f64> {
        self.values.get(joint).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Calibrated snapshot of every joint at one sampling instant
///
/// Every calibrated joint is present. `sequence` strictly increases within
/// a session and survives reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedFrame {
    /// Logical session this frame belongs to
    pub session_id: String,
    /// Per-session sequence number, starting at 1
    pub sequence: u64,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Angle keyed by joint name
    pub angles: BTreeMap<String, f64>,
}

impl CalibratedFrame {
    pub fn new(
        session_id: impl Into<String>,
        sequence: u64,
        timestamp_ms: u64,
        angles: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sequence,
            timestamp_ms,
            angles,
        }
    }

    pub fn angle(&self, joint: &str) -> Option<f64> {
        self.angles.get(joint).copied()
    }

    pub fn joint_count(&self) -> usize {
        self.angles.len()
    }
}

/// Wall-clock time in milliseconds since the Unix epoch
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_builder() {
        let frame = RawFrame::new(Duration::from_millis(33))
            .with_value("elbow", 512.0)
            .with_value("gripper", 2100.0);

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.get("elbow"), Some(512.0));
        assert_eq!(frame.get("wrist"), None);
    }

    #[test]
    fn test_calibrated_frame_json() {
        let mut angles = BTreeMap::new();
        angles.insert("elbow".to_string(), -12.5);
        let frame = CalibratedFrame::new("arm-1", 7, 1_700_000_000_000, angles);

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["session_id"], "arm-1");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["angles"]["elbow"], -12.5);
    }
}
