//! Streaming client configuration

use std::time::Duration;

use crate::frame::unix_millis;

/// Default server address
pub const DEFAULT_SERVER_ADDR: &str = "localhost:50051";

/// Default sampling rate in Hz
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 30.0;

/// Device id used when none is configured
pub const UNKNOWN_DEVICE: &str = "robot_unknown";

/// Streaming client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (`host:port`)
    pub server_addr: String,

    /// Sampling and transmission rate in Hz
    pub sample_rate_hz: f64,

    /// First reconnect delay
    pub initial_backoff: Duration,

    /// Reconnect delay ceiling
    pub max_backoff: Duration,

    /// TCP connect + hello must complete within this time
    pub connect_timeout: Duration,

    /// A single frame write must complete within this time
    pub write_timeout: Duration,

    /// Consecutive hardware faults on one joint before the client stops
    pub max_consecutive_failures: u32,

    /// Arm identifier
    pub device_id: String,

    /// Arm model
    pub robot_type: String,

    /// Logical session identity (generated from the device id if unset)
    pub session_id: Option<String>,

    /// Log a progress line every this many sent frames (0 = never)
    pub progress_interval: u64,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            max_consecutive_failures: 30,
            device_id: UNKNOWN_DEVICE.to_string(),
            robot_type: "unknown".to_string(),
            session_id: None,
            progress_interval: 30,
            tcp_nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given server address
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    /// Set the sampling rate; non-positive or non-finite rates are ignored
    pub fn sample_rate(mut self, hz: f64) -> Self {
        if hz.is_finite() && hz > 0.0 {
            self.sample_rate_hz = hz;
        }
        self
    }

    /// Set reconnect backoff bounds
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the hardware fault threshold (at least 1)
    pub fn max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    pub fn device(mut self, device_id: impl Into<String>, robot_type: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self.robot_type = robot_type.into();
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames;
        self
    }

    /// Time between sampling ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }

    /// Configured session id, or `{device_id}-{unix millis}`
    pub fn resolve_session_id(&self) -> String {
        self.session_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.device_id, unix_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.server_addr, "localhost:50051");
        assert_eq!(config.sample_rate_hz, 30.0);
        assert_eq!(config.max_consecutive_failures, 30);
        assert_eq!(config.device_id, "robot_unknown");
        assert_eq!(config.progress_interval, 30);
        assert!(config.session_id.is_none());
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_tick_period() {
        let config = ClientConfig::default().sample_rate(50.0);
        assert_eq!(config.tick_period(), Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_rate_ignored() {
        let config = ClientConfig::default().sample_rate(0.0).sample_rate(f64::NAN);
        assert_eq!(config.sample_rate_hz, 30.0);
    }

    #[test]
    fn test_backoff_ceiling_not_below_initial() {
        let config =
            ClientConfig::default().backoff(Duration::from_secs(2), Duration::from_secs(1));

        assert_eq!(config.initial_backoff, Duration::from_secs(2));
        assert_eq!(config.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_failure_threshold_at_least_one() {
        let config = ClientConfig::default().max_consecutive_failures(0);
        assert_eq!(config.max_consecutive_failures, 1);
    }

    #[test]
    fn test_session_id_resolution() {
        let config = ClientConfig::default().device("arm_7", "so101_leader");
        assert!(config.resolve_session_id().starts_with("arm_7-"));

        let config = config.session_id("fixed");
        assert_eq!(config.resolve_session_id(), "fixed");
    }

    #[test]
    fn test_builder_chaining() {
        let config = ClientConfig::new("10.0.0.2:6000")
            .sample_rate(10.0)
            .connect_timeout(Duration::from_secs(1))
            .write_timeout(Duration::from_millis(200))
            .progress_interval(0);

        assert_eq!(config.server_addr, "10.0.0.2:6000");
        assert_eq!(config.tick_period(), Duration::from_millis(100));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.write_timeout, Duration::from_millis(200));
        assert_eq!(config.progress_interval, 0);
    }
}
