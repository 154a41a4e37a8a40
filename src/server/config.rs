//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;
use crate::relay::RelayConfig;

/// Default telemetry ingest port
pub const DEFAULT_INGEST_PORT: u16 = 50051;

/// Default dashboard HTTP port
pub const DEFAULT_DASHBOARD_PORT: u16 = 8080;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the telemetry ingest listener binds to
    pub bind_addr: SocketAddr,

    /// Address the dashboard HTTP listener binds to (None = no dashboard)
    pub dashboard_addr: Option<SocketAddr>,

    /// Maximum concurrent ingest connections (0 = unlimited)
    pub max_connections: usize,

    /// A new stream must deliver its hello within this time
    pub handshake_timeout: Duration,

    /// Sessions with no frame for longer than this are removed; a stream
    /// silent for this long is closed
    pub idle_timeout: Duration,

    /// How often stale sessions are swept
    pub cleanup_interval: Duration,

    /// Largest accepted message payload
    pub max_message_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Interval between SSE keepalive comments
    pub keepalive_interval: Duration,

    /// Dashboard fan-out settings
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_INGEST_PORT)),
            dashboard_addr: Some(SocketAddr::from((
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_DASHBOARD_PORT,
            ))),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(1),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            tcp_nodelay: true, // Frames are tiny and latency-sensitive
            keepalive_interval: Duration::from_secs(15),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom ingest address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the ingest bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the dashboard bind address
    pub fn dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    /// Run without the dashboard HTTP listener
    pub fn disable_dashboard(mut self) -> Self {
        self.dashboard_addr = None;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the stale-session sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the message size limit
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the SSE keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the per-subscriber queue depth
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.relay = self.relay.subscriber_capacity(capacity);
        self
    }
}
