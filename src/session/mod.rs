//! Server-side client sessions
//!
//! A session is the logical continuation of one client's telemetry stream,
//! identified by the session id in its hello rather than by the TCP
//! connection carrying it.

pub mod error;
pub mod registry;
pub mod state;

pub use error::{IngestError, OutOfOrderFrameError};
pub use registry::{SessionOpen, SessionRegistry};
pub use state::{ClientSession, SessionPhase, SessionSnapshot};
