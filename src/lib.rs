//! Live joint telemetry from a robotic arm to remote dashboards
//!
//! ```text
//!  SampleSource ──► transform ──► StreamingClient ══TCP══► TelemetryServer
//!  (hardware or       (calibration     (fixed rate,            │ sessions
//!   simulator)         ranges)          reconnect)             ▼
//!                                                       DashboardRelay ──► SSE subscribers
//! ```
//!
//! # Streaming from the simulator
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use armstream::calibration::{CalibrationFile, CalibrationStore};
//! use armstream::source::DebugSimulator;
//! use armstream::{ClientConfig, StreamingClient};
//!
//! # async fn example() -> armstream::Result<()> {
//! let store = Arc::new(CalibrationStore::load(&CalibrationFile::new("robot_unknown.json"))?);
//! let source = DebugSimulator::new(&store, ["shoulder_pan"])?;
//!
//! let (client, _events) = StreamingClient::new(ClientConfig::default(), store, source);
//! client.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Serving dashboards
//!
//! ```no_run
//! use armstream::{ServerConfig, TelemetryServer};
//!
//! # async fn example() -> armstream::Result<()> {
//! let server = TelemetryServer::new(ServerConfig::default());
//! server.run().await
//! # }
//! ```

pub mod calibration;
pub mod client;
pub mod dashboard;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod source;
pub mod stats;
pub mod transform;

pub use client::{ClientConfig, ClientEvent, ClientState, StreamingClient};
pub use error::{Error, Result};
pub use frame::{CalibratedFrame, RawFrame};
pub use relay::{DashboardRelay, RelayConfig, Subscription};
pub use server::{ServerConfig, TelemetryServer};
pub use transform::transform;
