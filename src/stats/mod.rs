//! Server and subscriber statistics

pub mod metrics;

pub use metrics::{ServerStats, SubscriberStats};
