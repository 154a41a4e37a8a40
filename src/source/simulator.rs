//! Debug simulator
//!
//! Stands in for the arm when no hardware is attached. Animated joints
//! oscillate sinusoidally inside their raw interval; every other joint is
//! held at its raw midpoint.
//!
//! Joint `i` of `n` (artifact order) runs at `0.15 + 0.03 * i` Hz with a
//! phase offset of `2π * i / n`, so no two animated joints move in lockstep.
//! Output depends only on elapsed time: [`DebugSimulator::sample_at`] is pure.

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::time::Duration;

use tokio::time::Instant;

use crate::calibration::{CalibrationStore, UnknownJointError};
use crate::frame::RawFrame;

use super::error::HardwareReadError;
use super::SampleSource;

/// Oscillation frequency of the first joint
pub const BASE_FREQUENCY_HZ: f64 = 0.15;

/// Frequency added per joint index
pub const FREQUENCY_STEP_HZ: f64 = 0.03;

#[derive(Debug, Clone)]
struct SimulatedJoint {
    name: String,
    midpoint: f64,
    amplitude: f64,
    frequency_hz: f64,
    phase: f64,
    animated: bool,
}

impl SimulatedJoint {
    fn position_at(&self, t: f64) -> f64 {
        if !self.animated {
            return self.midpoint;
        }
        self.midpoint + self.amplitude * (TAU * self.frequency_hz * t + self.phase).sin()
    }
}

/// Deterministic synthetic sample source
#[derive(Debug, Clone)]
pub struct DebugSimulator {
    joints: Vec<SimulatedJoint>,
    started: Option<Instant>,
}

impl DebugSimulator {
    /// Animate `animated` joints of `store`, hold the rest at midpoint
    ///
    /// Fails if a name to animate is not in the calibration.
    pub fn new<I, S>(store: &CalibrationStore, animated: I) -> Result<Self, UnknownJointError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut live = HashSet::new();
        for name in animated {
            let range = store.resolve(name.as_ref())?;
            live.insert(range.joint_name.clone());
        }

        let count = store.len() as f64;
        let joints = store
            .ranges()
            .iter()
            .enumerate()
            .map(|(i, range)| SimulatedJoint {
                name: range.joint_name.clone(),
                midpoint: range.raw_midpoint(),
                amplitude: range.raw_half_span(),
                frequency_hz: BASE_FREQUENCY_HZ + FREQUENCY_STEP_HZ * i as f64,
                phase: TAU * i as f64 / count,
                animated: live.contains(&range.joint_name),
            })
            .collect::<Vec<_>>();

        let names: Vec<&str> = joints
            .iter()
            .filter(|j| j.animated)
            .map(|j| j.name.as_str())
            .collect();
        if names.is_empty() {
            tracing::info!("Debug simulator ready, all joints static");
        } else {
            tracing::info!(animated = %names.join(", "), "Debug simulator ready");
        }

        Ok(Self {
            joints,
            started: None,
        })
    }

    /// Raw frame at `elapsed` since the simulation started
    pub fn sample_at(&self, elapsed: Duration) -> RawFrame {
        let t = elapsed.as_secs_f64();
        let mut frame = RawFrame::new(elapsed);
        for joint in &self.joints {
            frame.insert(joint.name.as_str(), joint.position_at(t));
        }
        frame
    }

    /// Names of the joints in motion
    pub fn animated_joints(&self) -> impl Iterator<Item = &str> {
        self.joints
            .iter()
            .filter(|j| j.animated)
            .map(|j| j.name.as_str())
    }
}

impl SampleSource for DebugSimulator {
    async fn next_raw(&mut self) -> Result<RawFrame, HardwareReadError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        Ok(self.sample_at(started.elapsed()))
    }

    fn kind(&self) -> &'static str {
        "simulator"
    }
}
