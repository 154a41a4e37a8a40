//! Telemetry stream messages
//!
//! ```text
//! Client                                   Server
//!   |------- Hello (identity, joints) ---->|
//!   |------- Frame (seq 1) --------------->|
//!   |<------ Ack (seq 1) ------------------|
//!   |------- Frame (seq 2) --------------->|
//!   |<------ Ack (seq 2) ------------------|
//!   |                 ...                  |
//! ```
//!
//! Frames the server drops (out of order, partial) are not acknowledged.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationStore;
use crate::frame::CalibratedFrame;

/// A message on the telemetry stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Opens a stream; always the first client message
    Hello(Hello),
    /// One calibrated frame
    Frame(CalibratedFrame),
    /// Server acknowledgement of an applied frame
    Ack(Ack),
}

/// Angle bounds of one joint as announced in the hello
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointBounds {
    pub name: String,
    pub angle_min: f64,
    pub angle_max: f64,
}

impl JointBounds {
    /// Position of `angle` within the bounds, clamped to `[0, 1]`
    pub fn normalize(&self, angle: f64) -> f64 {
        let span = self.angle_max - self.angle_min;
        if span > 0.0 {
            ((angle - self.angle_min) / span).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

/// Stream-opening message carrying the session identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    /// Logical session identity, stable across reconnects
    pub session_id: String,
    /// Arm identifier
    pub device_id: String,
    /// Arm model
    pub robot_type: String,
    /// Every joint that will appear in each frame
    pub joints: Vec<JointBounds>,
}

impl Hello {
    /// Build a hello announcing every joint of `store`
    pub fn new(
        session_id: impl Into<String>,
        device_id: impl Into<String>,
        robot_type: impl Into<String>,
        store: &CalibrationStore,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            device_id: device_id.into(),
            robot_type: robot_type.into(),
            joints: store
                .ranges()
                .iter()
                .map(|r| JointBounds {
                    name: r.joint_name.clone(),
                    angle_min: r.angle_min,
                    angle_max: r.angle_max,
                })
                .collect(),
        }
    }

    /// Reason this hello cannot open a session, if any
    pub fn validate(&self) -> Result<(), String> {
        if self.session_id.is_empty() {
            return Err("empty session id".into());
        }
        if self.joints.is_empty() {
            return Err("no joints announced".into());
        }
        if let Some(bad) = self
            .joints
            .iter()
            .find(|j| !(j.angle_min.is_finite() && j.angle_max.is_finite() && j.angle_min < j.angle_max))
        {
            return Err(format!("invalid bounds for joint {}", bad.name));
        }
        Ok(())
    }
}

/// Acknowledgement of an applied frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub sequence: u64,
    pub success: bool,
    pub message: String,
}

impl Ack {
    /// Ack for a frame carrying `joint_count` values
    pub fn applied(sequence: u64, joint_count: usize) -> Self {
        Self {
            sequence,
            success: true,
            message: format!("Received data with {} state values", joint_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::calibration::CalibrationRange;

    #[test]
    fn test_tagged_json() {
        let ack = Message::Ack(Ack::applied(3, 6));
        let json = serde_json::to_value(&ack).unwrap();

        assert_eq!(json["type"], "ack");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["message"], "Received data with 6 state values");
    }

    #[test]
    fn test_frame_json_shape() {
        let mut angles = BTreeMap::new();
        angles.insert("elbow".to_string(), 10.0);
        let msg = Message::Frame(CalibratedFrame::new("s", 1, 5, angles));

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "frame");
        assert_eq!(json["angles"]["elbow"], 10.0);
    }

    #[test]
    fn test_hello_from_store() {
        let store = CalibrationStore::from_ranges(vec![
            CalibrationRange::new("elbow", 0.0, 1000.0, -90.0, 90.0),
            CalibrationRange::new("gripper", 0.0, 1000.0, 0.0, 100.0),
        ])
        .unwrap();
        let hello = Hello::new("arm-1", "arm", "so101_leader", &store);

        assert!(hello.validate().is_ok());
        assert_eq!(hello.joints.len(), 2);
        assert_eq!(hello.joints[1].angle_max, 100.0);
        assert_eq!(hello.joints[0].normalize(0.0), 0.5);
    }

    #[test]
    fn test_hello_validation() {
        let mut hello = Hello {
            session_id: String::new(),
            device_id: "arm".into(),
            robot_type: "so101_leader".into(),
            joints: vec![JointBounds {
                name: "elbow".into(),
                angle_min: 0.0,
                angle_max: 1.0,
            }],
        };
        assert!(hello.validate().is_err());

        hello.session_id = "arm-1".into();
        assert!(hello.validate().is_ok());

        hello.joints[0].angle_max = -1.0;
        assert!(hello.validate().is_err());
    }
}
