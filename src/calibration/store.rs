//! Calibration store
//!
//! Immutable after load. Wrap in `Arc` to share between tasks.

use std::collections::HashMap;

use super::error::{CalibrationError, UnknownJointError};
use super::range::CalibrationRange;
use super::source::CalibrationSource;

/// Validated set of joint ranges for one arm
///
/// Joint order is the order of the calibration artifact.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    ranges: Vec<CalibrationRange>,
    index: HashMap<String, usize>,
}

impl CalibrationStore {
    /// Load and validate ranges from a calibration source
    pub fn load<S: CalibrationSource + ?Sized>(source: &S) -> Result<Self, CalibrationError> {
        let store = Self::from_ranges(source.load_ranges()?)?;

        tracing::info!(
            joints = store.len(),
            source = %source.describe(),
            "Calibration loaded"
        );
        for range in &store.ranges {
            tracing::debug!(
                joint = %range.joint_name,
                raw_min = range.raw_min,
                raw_max = range.raw_max,
                angle_min = range.angle_min,
                angle_max = range.angle_max,
                "Joint range"
            );
        }

        Ok(store)
    }

    /// Build a store from ranges, rejecting empty, duplicate or degenerate entries
    pub fn from_ranges(ranges: Vec<CalibrationRange>) -> Result<Self, CalibrationError> {
        if ranges.is_empty() {
            return Err(CalibrationError::Empty);
        }

        let mut index = HashMap::with_capacity(ranges.len());
        for (i, range) in ranges.iter().enumerate() {
            range.validate()?;
            if index.insert(range.joint_name.clone(), i).is_some() {
                return Err(CalibrationError::DuplicateJoint(range.joint_name.clone()));
            }
        }

        Ok(Self { ranges, index })
    }

    /// Look up the range of a joint
    pub fn resolve(&self, joint_name: &str) -> Result<&CalibrationRange, UnknownJointError> {
        self.index
            .get(joint_name)
            .map(|&i| &self.ranges[i])
            .ok_or_else(|| UnknownJointError::new(joint_name))
    }

    /// Position of a joint in artifact order
    pub fn position(&self, joint_name: &str) -> Option<usize> {
        self.index.get(joint_name).copied()
    }

    /// All ranges in artifact order
    pub fn ranges(&self) -> &[CalibrationRange] {
        &self.ranges
    }

    /// Joint names in artifact order
    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.ranges.iter().map(|r| r.joint_name.as_str())
    }

    pub fn contains(&self, joint_name: &str) -> bool {
        self.index.contains_key(joint_name)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> Vec<CalibrationRange> {
        vec![
            CalibrationRange::new("shoulder_pan", 700.0, 3400.0, -100.0, 100.0),
            CalibrationRange::new("elbow", 0.0, 1000.0, -90.0, 90.0),
            CalibrationRange::new("gripper", 2000.0, 3300.0, 0.0, 100.0),
        ]
    }

    #[test]
    fn test_resolve() {
        let store = CalibrationStore::from_ranges(arm()).unwrap();

        let elbow = store.resolve("elbow").unwrap();
        assert_eq!(elbow.raw_max, 1000.0);
        assert_eq!(store.position("gripper"), Some(2));
    }

    #[test]
    fn test_resolve_unknown() {
        let store = CalibrationStore::from_ranges(arm()).unwrap();

        let err = store.resolve("tail").unwrap_err();
        assert_eq!(err.joint(), "tail");
    }

    #[test]
    fn test_preserves_order() {
        let store = CalibrationStore::from_ranges(arm()).unwrap();
        let names: Vec<_> = store.joint_names().collect();
        assert_eq!(names, vec!["shoulder_pan", "elbow", "gripper"]);
    }

    #[test]
    fn test_rejects_duplicate() {
        let mut ranges = arm();
        ranges.push(CalibrationRange::new("elbow", 0.0, 10.0, -1.0, 1.0));

        let result = CalibrationStore::from_ranges(ranges);
        assert_eq!(
            result.unwrap_err(),
            CalibrationError::DuplicateJoint("elbow".into())
        );
    }

    #[test]
    fn test_rejects_degenerate() {
        let mut ranges = arm();
        ranges[1].raw_min = 1000.0;

        let result = CalibrationStore::from_ranges(ranges);
        assert!(matches!(result, Err(CalibrationError::InvalidRange { .. })));
    }

    #[test]
    fn test_rejects_empty() {
        let result = CalibrationStore::from_ranges(Vec::new());
        assert_eq!(result.unwrap_err(), CalibrationError::Empty);
    }
}
