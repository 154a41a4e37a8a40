//! Hardware-backed sample source

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::calibration::CalibrationStore;
use crate::frame::RawFrame;

use super::error::HardwareReadError;
use super::SampleSource;

/// Default bound on a single device read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Physical encoder bus
///
/// Implemented by device drivers. Keys may carry a field suffix
/// (`shoulder_pan.pos`); everything after the first `.` is ignored.
pub trait JointDevice: Send {
    /// Read the present position of every joint on the bus
    fn read_positions(
        &mut self,
    ) -> impl Future<Output = Result<HashMap<String, f64>, HardwareReadError>> + Send;

    /// Whether the device link is up
    fn is_connected(&self) -> bool;
}

/// Sample source reading a [`JointDevice`] once per call
pub struct HardwareReader<D> {
    device: D,
    joints: Vec<String>,
    read_timeout: Duration,
    started: Option<Instant>,
}

impl<D: JointDevice> HardwareReader<D> {
    /// Read the joints of `store` from `device`
    pub fn new(device: D, store: &CalibrationStore) -> Self {
        Self {
            device,
            joints: store.joint_names().map(String::from).collect(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            started: None,
        }
    }

    /// Set the per-read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn build_frame(
        &self,
        captured_at: Duration,
        readings: HashMap<String, f64>,
    ) -> Result<RawFrame, HardwareReadError> {
        let readings: HashMap<&str, f64> = readings
            .iter()
            .map(|(key, &value)| (joint_key(key), value))
            .collect();

        let mut frame = RawFrame::new(captured_at);
        for joint in &self.joints {
            match readings.get(joint.as_str()) {
                Some(&value) if value.is_finite() => frame.insert(joint.as_str(), value),
                Some(_) => {
                    return Err(HardwareReadError::device("non-finite reading").for_joint(joint))
                }
                None => return Err(HardwareReadError::missing_reading(joint.as_str())),
            }
        }
        Ok(frame)
    }
}

impl<D: JointDevice> SampleSource for HardwareReader<D> {
    async fn next_raw(&mut self) -> Result<RawFrame, HardwareReadError> {
        if !self.device.is_connected() {
            return Err(HardwareReadError::disconnected());
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        let readings = tokio::time::timeout(self.read_timeout, self.device.read_positions())
            .await
            .map_err(|_| HardwareReadError::timeout(self.read_timeout))??;

        self.build_frame(started.elapsed(), readings)
    }

    fn kind(&self) -> &'static str {
        "hardware"
    }
}

/// Strip a field suffix such as `.pos` from a device key
fn joint_key(key: &str) -> &str {
    key.split_once('.').map_or(key, |(joint, _)| joint)
}
