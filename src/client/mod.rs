//! Streaming telemetry client
//!
//! Samples a [`SampleSource`](crate::source::SampleSource) at a fixed rate
//! and pushes calibrated frames to the telemetry server, reconnecting with
//! exponential backoff when the stream drops.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod state;
pub mod streamer;

pub use backoff::{Backoff, FailureTracker};
pub use config::ClientConfig;
pub use connection::TelemetryConnection;
pub use state::{ClientEvent, ClientReport, ClientState, SkipReason};
pub use streamer::StreamingClient;
