//! Error types
//!
//! Each area keeps its own error enum next to the code that raises it;
//! [`Error`] ties them together for the top-level entry points.

use std::time::Duration;

use crate::calibration::{CalibrationError, UnknownJointError};
use crate::relay::RelayError;
use crate::session::IngestError;
use crate::source::HardwareReadError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Calibration could not be loaded or is invalid (fatal at startup)
    Calibration(CalibrationError),
    /// Configuration references a joint the calibration does not know (fatal)
    UnknownJoint(UnknownJointError),
    /// Sample source fault that persisted past the configured threshold
    Hardware(HardwareReadError),
    /// Transport failure
    Transport(TransportError),
    /// Server-side ingest failure
    Ingest(IngestError),
    /// Dashboard relay failure
    Relay(RelayError),
    /// I/O error outside of an established stream (e.g. bind)
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Calibration(e) => write!(f, "Calibration error: {}", e),
            Error::UnknownJoint(e) => write!(f, "{}", e),
            Error::Hardware(e) => write!(f, "Hardware error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Ingest(e) => write!(f, "Ingest error: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Calibration(e) => Some(e),
            Error::UnknownJoint(e) => Some(e),
            Error::Hardware(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Ingest(e) => Some(e),
            Error::Relay(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Error::Calibration(e)
    }
}

impl From<UnknownJointError> for Error {
    fn from(e: UnknownJointError) -> Self {
        Error::UnknownJoint(e)
    }
}

impl From<HardwareReadError> for Error {
    fn from(e: HardwareReadError) -> Self {
        Error::Hardware(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<IngestError> for Error {
    fn from(e: IngestError) -> Self {
        Error::Ingest(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Errors on the client/server telemetry stream
#[derive(Debug)]
pub enum TransportError {
    /// Socket I/O failure
    Io(std::io::Error),
    /// Message could not be serialized
    Encode(String),
    /// Payload could not be parsed
    Decode(String),
    /// Length prefix exceeds the configured maximum
    MessageTooLarge { size: usize, max: usize },
    /// Peer closed the stream in the middle of a message
    UnexpectedEof,
    /// Operation did not complete in time
    Timeout(Duration),
    /// Stream already closed
    Closed,
    /// Stream opened without a valid hello
    Handshake(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {}", e),
            TransportError::Encode(msg) => write!(f, "Encode failed: {}", msg),
            TransportError::Decode(msg) => write!(f, "Decode failed: {}", msg),
            TransportError::MessageTooLarge { size, max } => {
                write!(f, "Message of {} bytes exceeds limit of {} bytes", size, max)
            }
            TransportError::UnexpectedEof => write!(f, "Stream ended mid-message"),
            TransportError::Timeout(after) => write!(f, "Timed out after {:?}", after),
            TransportError::Closed => write!(f, "Stream closed"),
            TransportError::Handshake(msg) => write!(f, "Handshake failed: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}
