//! Calibration artifact loading and saving
//!
//! The artifact is a JSON object keyed by joint name:
//!
//! ```json
//! {
//!   "shoulder_pan": { "id": 1, "drive_mode": 0, "homing_offset": -1470,
//!                     "range_min": 758, "range_max": 3292 },
//!   "elbow":        { "raw_min": 0, "raw_max": 1000,
//!                     "angle_min": -90, "angle_max": 90 }
//! }
//! ```
//!
//! `range_min`/`range_max` are accepted for the raw bounds. When the angle
//! bounds are absent they are inferred from the joint name: grippers open
//! from 0 to 100, every other joint swings from -100 to 100.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::CalibrationError;
use super::range::CalibrationRange;
use super::store::CalibrationStore;

/// Angle bounds used when a gripper record has none
pub const GRIPPER_ANGLE_BOUNDS: (f64, f64) = (0.0, 100.0);

/// Angle bounds used when any other joint record has none
pub const JOINT_ANGLE_BOUNDS: (f64, f64) = (-100.0, 100.0);

/// Something calibration ranges can be loaded from
pub trait CalibrationSource {
    /// Produce the raw (not yet validated) ranges in artifact order
    fn load_ranges(&self) -> Result<Vec<CalibrationRange>, CalibrationError>;

    /// Human-readable origin, used in logs
    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

impl CalibrationSource for [CalibrationRange] {
    fn load_ranges(&self) -> Result<Vec<CalibrationRange>, CalibrationError> {
        Ok(self.to_vec())
    }
}

impl CalibrationSource for Vec<CalibrationRange> {
    fn load_ranges(&self) -> Result<Vec<CalibrationRange>, CalibrationError> {
        Ok(self.clone())
    }
}

/// One joint record as stored in the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JointRecord {
    #[serde(alias = "range_min")]
    raw_min: f64,
    #[serde(alias = "range_max")]
    raw_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    angle_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    angle_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    drive_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    homing_offset: Option<f64>,
}

impl JointRecord {
    fn into_range(self, joint_name: &str) -> CalibrationRange {
        let (default_min, default_max) = default_angle_bounds(joint_name);
        CalibrationRange::new(
            joint_name,
            self.raw_min,
            self.raw_max,
            self.angle_min.unwrap_or(default_min),
            self.angle_max.unwrap_or(default_max),
        )
    }

    fn from_range(range: &CalibrationRange) -> Self {
        Self {
            raw_min: range.raw_min,
            raw_max: range.raw_max,
            angle_min: Some(range.angle_min),
            angle_max: Some(range.angle_max),
            id: None,
            drive_mode: None,
            homing_offset: None,
        }
    }
}

/// Angle bounds assumed for a joint whose record carries none
pub fn default_angle_bounds(joint_name: &str) -> (f64, f64) {
    if joint_name.to_ascii_lowercase().contains("gripper") {
        GRIPPER_ANGLE_BOUNDS
    } else {
        JOINT_ANGLE_BOUNDS
    }
}

/// Parse a calibration artifact, keeping joint order
pub fn parse_json(text: &str) -> Result<Vec<CalibrationRange>, CalibrationError> {
    let root: Map<String, Value> =
        serde_json::from_str(text).map_err(|e| CalibrationError::Malformed(e.to_string()))?;

    root.into_iter()
        .map(|(joint_name, value)| {
            let record: JointRecord = serde_json::from_value(value).map_err(|e| {
                CalibrationError::Malformed(format!("joint {}: {}", joint_name, e))
            })?;
            Ok(record.into_range(&joint_name))
        })
        .collect()
}

/// Serialize a store back into the artifact format
pub fn to_json(store: &CalibrationStore) -> Result<String, CalibrationError> {
    let mut root = Map::with_capacity(store.len());
    for range in store.ranges() {
        let value = serde_json::to_value(JointRecord::from_range(range))
            .map_err(|e| CalibrationError::Malformed(e.to_string()))?;
        root.insert(range.joint_name.clone(), value);
    }
    serde_json::to_string_pretty(&root).map_err(|e| CalibrationError::Malformed(e.to_string()))
}

/// Calibration artifact held in memory as JSON text
#[derive(Debug, Clone)]
pub struct JsonCalibration {
    text: String,
}

impl JsonCalibration {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl CalibrationSource for JsonCalibration {
    fn load_ranges(&self) -> Result<Vec<CalibrationRange>, CalibrationError> {
        parse_json(&self.text)
    }
}

/// Calibration artifact on disk
#[derive(Debug, Clone)]
pub struct CalibrationFile {
    path: PathBuf,
}

impl CalibrationFile {
    /// Use the artifact at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use `<dir>/<device_id>.json`
    pub fn for_device(dir: impl AsRef<Path>, device_id: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", device_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the store to this artifact, creating parent directories
    pub fn save(&self, store: &CalibrationStore) -> Result<(), CalibrationError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CalibrationError::Io(e.to_string()))?;
        }
        let text = to_json(store)?;
        std::fs::write(&self.path, text).map_err(|e| CalibrationError::Io(e.to_string()))?;

        tracing::info!(path = %self.path.display(), joints = store.len(), "Calibration saved");
        Ok(())
    }
}

impl CalibrationSource for CalibrationFile {
    fn load_ranges(&self) -> Result<Vec<CalibrationRange>, CalibrationError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CalibrationError::Missing(self.path.display().to_string()));
            }
            Err(e) => return Err(CalibrationError::Io(e.to_string())),
        };
        parse_json(&text)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SO101: &str = r#"{
        "shoulder_pan": {"id": 1, "drive_mode": 0, "homing_offset": -1470, "range_min": 758, "range_max": 3292},
        "elbow_flex": {"id": 3, "drive_mode": 0, "homing_offset": 1120, "range_min": 880, "range_max": 3100},
        "gripper": {"id": 6, "drive_mode": 0, "homing_offset": 1407, "range_min": 2031, "range_max": 3476}
    }"#;

    #[test]
    fn test_parse_legacy_format() {
        let ranges = parse_json(SO101).unwrap();

        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].joint_name, "shoulder_pan");
        assert_eq!(ranges[0].raw_min, 758.0);
        assert_eq!(ranges[0].raw_max, 3292.0);
        assert_eq!((ranges[0].angle_min, ranges[0].angle_max), JOINT_ANGLE_BOUNDS);
        assert_eq!((ranges[2].angle_min, ranges[2].angle_max), GRIPPER_ANGLE_BOUNDS);
    }

    #[test]
    fn test_parse_keeps_artifact_order() {
        let text = r#"{"zeta": {"raw_min": 0, "raw_max": 1}, "alpha": {"raw_min": 0, "raw_max": 1}}"#;
        let ranges = parse_json(text).unwrap();
        assert_eq!(ranges[0].joint_name, "zeta");
        assert_eq!(ranges[1].joint_name, "alpha");
    }

    #[test]
    fn test_parse_explicit_angles() {
        let text = r#"{"elbow": {"raw_min": 0, "raw_max": 1000, "angle_min": -90, "angle_max": 90}}"#;
        let ranges = parse_json(text).unwrap();
        assert_eq!(ranges[0].angle_min, -90.0);
        assert_eq!(ranges[0].angle_max, 90.0);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_json("not json"),
            Err(CalibrationError::Malformed(_))
        ));
        assert!(matches!(
            parse_json(r#"{"elbow": {"raw_min": 0}}"#),
            Err(CalibrationError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = CalibrationFile::for_device(dir.path(), "arm_01");

        assert!(!file.exists());
        assert!(matches!(
            CalibrationStore::load(&file),
            Err(CalibrationError::Missing(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::load(&JsonCalibration::new(SO101)).unwrap();

        let file = CalibrationFile::for_device(dir.path().join("calibration"), "arm_01");
        file.save(&store).unwrap();
        assert!(file.exists());

        let reloaded = CalibrationStore::load(&file).unwrap();
        assert_eq!(reloaded.ranges(), store.ranges());
    }

    #[test]
    fn test_load_rejects_degenerate_joint() {
        let text = r#"{"elbow": {"raw_min": 1000, "raw_max": 10}}"#;
        let result = CalibrationStore::load(&JsonCalibration::new(text));
        assert!(matches!(result, Err(CalibrationError::InvalidRange { .. })));
    }
}
