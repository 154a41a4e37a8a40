//! Calibration error types

/// Error raised while loading or validating calibration
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Calibration artifact does not exist
    Missing(String),
    /// Artifact could not be parsed
    Malformed(String),
    /// A joint's bounds are degenerate or non-finite
    InvalidRange {
        joint: String,
        reason: &'static str,
    },
    /// The same joint name appears twice
    DuplicateJoint(String),
    /// Artifact parsed but contains no joints
    Empty,
    /// Artifact could not be read or written
    Io(String),
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::Missing(path) => write!(f, "Calibration not found: {}", path),
            CalibrationError::Malformed(msg) => write!(f, "Malformed calibration: {}", msg),
            CalibrationError::InvalidRange { joint, reason } => {
                write!(f, "Invalid range for joint {}: {}", joint, reason)
            }
            CalibrationError::DuplicateJoint(joint) => {
                write!(f, "Joint listed more than once: {}", joint)
            }
            CalibrationError::Empty => write!(f, "Calibration contains no joints"),
            CalibrationError::Io(msg) => write!(f, "Calibration I/O error: {}", msg),
        }
    }
}

impl std::error::Error for CalibrationError {}

/// Lookup of a joint that is not part of the loaded calibration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownJointError {
    joint: String,
}

impl UnknownJointError {
    pub fn new(joint: impl Into<String>) -> Self {
        Self {
            joint: joint.into(),
        }
    }

    /// Name of the joint that failed to resolve
    pub fn joint(&self) -> &str {
        &self.joint
    }
}

impl std::fmt::Display for UnknownJointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown joint: {}", self.joint)
    }
}

impl std::error::Error for UnknownJointError {}
