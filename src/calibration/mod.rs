//! Joint calibration
//!
//! Loads per-joint raw-to-angle ranges once at startup. The store is plain
//! data with no mutation API; share it behind an `Arc`.

pub mod error;
pub mod range;
pub mod source;
pub mod store;

pub use error::{CalibrationError, UnknownJointError};
pub use range::CalibrationRange;
pub use source::{CalibrationFile, CalibrationSource, JsonCalibration};
pub use store::CalibrationStore;
