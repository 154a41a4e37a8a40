//! Per-joint calibration range

use serde::{Deserialize, Serialize};

use super::error::CalibrationError;

/// Maps one joint's raw encoder interval onto its physical angle interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRange {
    /// Joint name (unique within a calibration)
    pub joint_name: String,
    /// Lowest raw reading, device units
    pub raw_min: f64,
    /// Highest raw reading, device units
    pub raw_max: f64,
    /// Angle reported at `raw_min`
    pub angle_min: f64,
    /// Angle reported at `raw_max`
    pub angle_max: f64,
}

impl CalibrationRange {
    /// Create a new range
    pub fn new(
        joint_name: impl Into<String>,
        raw_min: f64,
        raw_max: f64,
        angle_min: f64,
        angle_max: f64,
    ) -> Self {
        Self {
            joint_name: joint_name.into(),
            raw_min,
            raw_max,
            angle_min,
            angle_max,
        }
    }

    /// Check that both intervals are finite and strictly ordered
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let finite = [self.raw_min, self.raw_max, self.angle_min, self.angle_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(self.invalid("bounds must be finite"));
        }
        if self.raw_min >= self.raw_max {
            return Err(self.invalid("raw_min must be below raw_max"));
        }
        if self.angle_min >= self.angle_max {
            return Err(self.invalid("angle_min must be below angle_max"));
        }
        Ok(())
    }

    /// Center of the raw interval
    pub fn raw_midpoint(&self) -> f64 {
        (self.raw_min + self.raw_max) / 2.0
    }

    /// Half the width of the raw interval
    pub fn raw_half_span(&self) -> f64 {
        (self.raw_max - self.raw_min) / 2.0
    }

    /// Position of `angle` within the angle interval, clamped to `[0, 1]`
    pub fn normalize_angle(&self, angle: f64) -> f64 {
        ((angle - self.angle_min) / (self.angle_max - self.angle_min)).clamp(0.0, 1.0)
    }

    /// Whether `angle` lies inside the angle interval (bounds included)
    pub fn contains_angle(&self, angle: f64) -> bool {
        angle >= self.angle_min && angle <= self.angle_max
    }

    fn invalid(&self, reason: &'static str) -> CalibrationError {
        CalibrationError::InvalidRange {
            joint: self.joint_name.clone(),
            reason,
        }
    }
}
