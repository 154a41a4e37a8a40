//! Session ingest errors

/// Frame whose sequence number does not advance its session
///
/// Logged and dropped; never reported to the sending client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfOrderFrameError {
    pub session_id: String,
    /// Sequence carried by the rejected frame
    pub sequence: u64,
    /// Highest sequence already applied
    pub last_sequence: u64,
}

impl std::fmt::Display for OutOfOrderFrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame {} of session {} does not follow {}",
            self.sequence, self.session_id, self.last_sequence
        )
    }
}

impl std::error::Error for OutOfOrderFrameError {}

/// Reasons a frame is not applied to session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Duplicate or stale sequence number
    OutOfOrder(OutOfOrderFrameError),
    /// Frame lacks a joint announced in the hello
    IncompleteFrame { session_id: String, joint: String },
    /// No live session with this identity (never opened or expired)
    UnknownSession(String),
    /// Another connection has taken over the session
    Superseded { session_id: String },
    /// Frame names a different session than its stream
    SessionMismatch { expected: String, actual: String },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::OutOfOrder(e) => write!(f, "{}", e),
            IngestError::IncompleteFrame { session_id, joint } => {
                write!(f, "Frame of session {} lacks joint {}", session_id, joint)
            }
            IngestError::UnknownSession(id) => write!(f, "Unknown session: {}", id),
            IngestError::Superseded { session_id } => {
                write!(f, "Session {} was taken over by another stream", session_id)
            }
            IngestError::SessionMismatch { expected, actual } => {
                write!(f, "Frame for session {} on stream of {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for IngestError {}

impl From<OutOfOrderFrameError> for IngestError {
    fn from(e: OutOfOrderFrameError) -> Self {
        IngestError::OutOfOrder(e)
    }
}
