//! Sample source errors

use std::time::Duration;

/// What went wrong while reading the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareFault {
    /// Device is not connected
    Disconnected,
    /// Read did not complete within the bound
    Timeout(Duration),
    /// Device answered without a reading for a calibrated joint
    MissingReading,
    /// Driver-specific failure
    Device(String),
}

/// Failure to produce one raw frame
///
/// Recoverable: the streaming client skips the tick. `joint` is set when the
/// fault can be attributed to a single joint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareReadError {
    joint: Option<String>,
    fault: HardwareFault,
}

impl HardwareReadError {
    pub fn new(fault: HardwareFault) -> Self {
        Self { joint: None, fault }
    }

    pub fn disconnected() -> Self {
        Self::new(HardwareFault::Disconnected)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(HardwareFault::Timeout(after))
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::new(HardwareFault::Device(msg.into()))
    }

    pub fn missing_reading(joint: impl Into<String>) -> Self {
        Self::new(HardwareFault::MissingReading).for_joint(joint)
    }

    /// Attribute this fault to a joint
    pub fn for_joint(mut self, joint: impl Into<String>) -> Self {
        self.joint = Some(joint.into());
        self
    }

    pub fn joint(&self) -> Option<&str> {
        self.joint.as_deref()
    }

    pub fn fault(&self) -> &HardwareFault {
        &self.fault
    }
}

impl std::fmt::Display for HardwareReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fault {
            HardwareFault::Disconnected => write!(f, "device disconnected")?,
            HardwareFault::Timeout(after) => write!(f, "read timed out after {:?}", after)?,
            HardwareFault::MissingReading => write!(f, "no reading")?,
            HardwareFault::Device(msg) => write!(f, "device error: {}", msg)?,
        }
        if let Some(joint) = &self.joint {
            write!(f, " (joint {})", joint)?;
        }
        Ok(())
    }
}

impl std::error::Error for HardwareReadError {}
