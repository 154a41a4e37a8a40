//! Raw reading to calibrated angle
//!
//! Pure functions. Ranges reaching [`transform`] have already been validated
//! by the calibration store, so the raw span is never zero.

use std::collections::BTreeMap;

use crate::calibration::{CalibrationRange, CalibrationStore, UnknownJointError};
use crate::frame::RawFrame;

/// Linearly map `raw` from the raw interval onto the angle interval
///
/// Out-of-range readings (sensor noise, end of travel) clamp to the nearest
/// angle bound.
pub fn transform(raw: f64, range: &CalibrationRange) -> f64 {
    let t = (raw - range.raw_min) / (range.raw_max - range.raw_min);
    let angle = range.angle_min + t * (range.angle_max - range.angle_min);
    angle.clamp(range.angle_min, range.angle_max)
}

/// Why a raw frame could not be calibrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame carries a joint the calibration does not know
    UnknownJoint(UnknownJointError),
    /// Frame lacks a calibrated joint
    MissingJoint(String),
    /// Reading is NaN or infinite
    NonFinite(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::UnknownJoint(e) => write!(f, "{}", e),
            FrameError::MissingJoint(joint) => write!(f, "Missing reading for joint {}", joint),
            FrameError::NonFinite(joint) => write!(f, "Non-finite reading for joint {}", joint),
        }
    }
}

impl std::error::Error for FrameError {}

/// Calibrate every joint of a raw frame
///
/// The result holds exactly the store's joints; partial frames and
/// non-finite readings are refused.
pub fn transform_frame(
    raw: &RawFrame,
    store: &CalibrationStore,
) -> Result<BTreeMap<String, f64>, FrameError> {
    if let Some(unknown) = raw.values.keys().find(|joint| !store.contains(joint)) {
        return Err(FrameError::UnknownJoint(UnknownJointError::new(unknown.as_str())));
    }

    store
        .ranges()
        .iter()
        .map(|range| match raw.get(&range.joint_name) {
            Some(value) if value.is_finite() => {
                Ok((range.joint_name.clone(), transform(value, range)))
            }
            Some(_) => Err(FrameError::NonFinite(range.joint_name.clone())),
            None => Err(FrameError::MissingJoint(range.joint_name.clone())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn elbow() -> CalibrationRange {
        CalibrationRange::new("elbow", 0.0, 1000.0, -90.0, 90.0)
    }

    #[test]
    fn test_elbow_scenario() {
        let range = elbow();
        assert_eq!(transform(500.0, &range), 0.0);
        assert_eq!(transform(1200.0, &range), 90.0);
        assert_eq!(transform(-50.0, &range), -90.0);
    }

    #[test]
    fn test_bounds_map_exactly() {
        let range = elbow();
        assert_eq!(transform(0.0, &range), -90.0);
        assert_eq!(transform(1000.0, &range), 90.0);
    }

    #[test]
    fn test_monotonic_within_range() {
        let range = CalibrationRange::new("wrist", 758.0, 3292.0, -100.0, 100.0);
        let mut previous = f64::NEG_INFINITY;
        let mut raw = range.raw_min;
        while raw <= range.raw_max {
            let angle = transform(raw, &range);
            assert!(angle >= previous);
            assert!(range.contains_angle(angle));
            previous = angle;
            raw += 7.3;
        }
    }

    #[test]
    fn test_extreme_inputs_clamp() {
        let ranges = [
            elbow(),
            CalibrationRange::new("gripper", 2031.0, 3476.0, 0.0, 100.0),
            CalibrationRange::new("tiny", -0.5, 0.5, -1.0, 1.0),
        ];
        for range in &ranges {
            assert_eq!(transform(range.raw_min - 1000.0, range), range.angle_min);
            assert_eq!(transform(range.raw_max + 1000.0, range), range.angle_max);
            assert_eq!(transform(f64::MAX, range), range.angle_max);
            assert_eq!(transform(f64::MIN, range), range.angle_min);
        }
    }

    #[test]
    fn test_transform_frame() {
        let store = CalibrationStore::from_ranges(vec![
            elbow(),
            CalibrationRange::new("gripper", 0.0, 100.0, 0.0, 100.0),
        ])
        .unwrap();
        let raw = RawFrame::new(Duration::ZERO)
            .with_value("elbow", 750.0)
            .with_value("gripper", 150.0);

        let angles = transform_frame(&raw, &store).unwrap();
        assert_eq!(angles.len(), 2);
        assert_eq!(angles["elbow"], 45.0);
        assert_eq!(angles["gripper"], 100.0);
    }

    #[test]
    fn test_transform_frame_refuses_partial() {
        let store = CalibrationStore::from_ranges(vec![
            elbow(),
            CalibrationRange::new("gripper", 0.0, 100.0, 0.0, 100.0),
        ])
        .unwrap();
        let raw = RawFrame::new(Duration::ZERO).with_value("elbow", 750.0);

        assert_eq!(
            transform_frame(&raw, &store),
            Err(FrameError::MissingJoint("gripper".into()))
        );
    }

    #[test]
    fn test_transform_frame_refuses_non_finite() {
        let store = CalibrationStore::from_ranges(vec![
            elbow(),
            CalibrationRange::new("gripper", 0.0, 100.0, 0.0, 100.0),
        ])
        .unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let raw = RawFrame::new(Duration::ZERO)
                .with_value("elbow", bad)
                .with_value("gripper", 50.0);
            assert_eq!(
                transform_frame(&raw, &store),
                Err(FrameError::NonFinite("elbow".into()))
            );
        }
    }

    #[test]
    fn test_transform_frame_unknown_joint() {
        let store = CalibrationStore::from_ranges(vec![elbow()]).unwrap();
        let raw = RawFrame::new(Duration::ZERO)
            .with_value("elbow", 750.0)
            .with_value("tail", 1.0);

        assert!(matches!(
            transform_frame(&raw, &store),
            Err(FrameError::UnknownJoint(ref e)) if e.joint() == "tail"
        ));
    }
}
