//! Telemetry server
//!
//! Terminates client streams, keeps the latest frame of every session and
//! publishes applied frames to the dashboard relay.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::{ServerConfig, DEFAULT_DASHBOARD_PORT, DEFAULT_INGEST_PORT};
pub use connection::IngestConnection;
pub use listener::TelemetryServer;
