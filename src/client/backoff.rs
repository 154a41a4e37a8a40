//! Reconnect backoff and hardware fault tracking

use std::time::Duration;

use crate::source::HardwareReadError;

/// Exponential backoff with a ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; doubles each call up to the ceiling
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Counts consecutive hardware faults attributed to the same joint
///
/// Faults without a joint (whole-device faults) share one key. A
/// successful read or a fault on a different key restarts the count.
#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    key: Option<String>,
    count: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            key: None,
            count: 0,
        }
    }

    /// Record a fault; returns true once the threshold is reached
    pub fn record(&mut self, error: &HardwareReadError) -> bool {
        let key = error.joint().unwrap_or("<device>");
        if self.key.as_deref() == Some(key) {
            self.count += 1;
        } else {
            self.key = Some(key.to_string());
            self.count = 1;
        }
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.key = None;
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(5));

        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_many_attempts_saturates() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_secs(1));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_tracker_same_joint_escalates() {
        let mut tracker = FailureTracker::new(3);
        let err = HardwareReadError::missing_reading("elbow");

        assert!(!tracker.record(&err));
        assert!(!tracker.record(&err));
        assert!(tracker.record(&err));
    }

    #[test]
    fn test_tracker_different_joint_restarts() {
        let mut tracker = FailureTracker::new(2);

        assert!(!tracker.record(&HardwareReadError::missing_reading("elbow")));
        assert!(!tracker.record(&HardwareReadError::missing_reading("wrist_roll")));
        assert!(tracker.record(&HardwareReadError::missing_reading("wrist_roll")));
    }

    #[test]
    fn test_tracker_reset_on_success() {
        let mut tracker = FailureTracker::new(2);
        let err = HardwareReadError::disconnected();

        assert!(!tracker.record(&err));
        tracker.reset();
        assert!(!tracker.record(&err));
        assert_eq!(tracker.count(), 1);
    }
}
