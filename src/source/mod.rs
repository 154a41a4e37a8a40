//! Raw sample sources
//!
//! The streaming client is written once against [`SampleSource`]; the
//! concrete source is picked at construction time:
//!
//! - [`HardwareReader`] polls a physical [`JointDevice`]
//! - [`DebugSimulator`] produces deterministic synthetic motion

pub mod error;
pub mod hardware;
pub mod simulator;

use std::future::Future;

use crate::frame::RawFrame;

pub use error::{HardwareFault, HardwareReadError};
pub use hardware::{HardwareReader, JointDevice};
pub use simulator::DebugSimulator;

/// Producer of one raw reading per calibrated joint
pub trait SampleSource: Send {
    /// Read one frame
    ///
    /// Every joint known to the calibration store is present in a returned
    /// frame. Errors are per-call; the next call may succeed.
    fn next_raw(&mut self) -> impl Future<Output = Result<RawFrame, HardwareReadError>> + Send;

    /// Short name used in logs
    fn kind(&self) -> &'static str;
}
