//! Server-side session state
//!
//! Tracks one client's logical telemetry stream from its first hello until
//! it goes idle.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::frame::CalibratedFrame;
use crate::protocol::{Hello, JointBounds};
use crate::relay::{ConnectionStatus, FrameEvent, StatusEvent};

use super::error::{IngestError, OutOfOrderFrameError};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// A stream is attached and delivering frames
    Streaming,
    /// Stream closed; the session resumes if the client reconnects in time
    Detached,
}

/// Complete session state
#[derive(Debug)]
pub struct ClientSession {
    /// Logical session identity
    pub session_id: String,

    /// Arm identifier from the hello
    pub device_id: String,

    /// Arm model from the hello
    pub robot_type: String,

    /// Joints every frame must carry
    pub joints: Vec<JointBounds>,

    /// Most recently applied frame
    pub last_frame: Option<CalibratedFrame>,

    /// When the session was created
    pub connected_at: Instant,

    /// When the session last received a frame (or was opened)
    pub last_seen_at: Instant,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection currently feeding the session
    pub connection_id: Option<u64>,

    /// Frames applied
    pub frames_applied: u64,

    /// Frames dropped as out of order or incomplete
    pub frames_dropped: u64,
}

impl ClientSession {
    /// Create a new session from a hello
    pub fn new(hello: &Hello, connection_id: u64) -> Self {
        let now = Instant::now();
        Self {
            session_id: hello.session_id.clone(),
            device_id: hello.device_id.clone(),
            robot_type: hello.robot_type.clone(),
            joints: hello.joints.clone(),
            last_frame: None,
            connected_at: now,
            last_seen_at: now,
            phase: SessionPhase::Streaming,
            connection_id: Some(connection_id),
            frames_applied: 0,
            frames_dropped: 0,
        }
    }

    /// Highest applied sequence number
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_frame.as_ref().map(|f| f.sequence)
    }

    /// Attach a (new) connection
    ///
    /// Joint announcements from the new hello replace the old ones.
    pub fn attach(&mut self, hello: &Hello, connection_id: u64) {
        self.device_id = hello.device_id.clone();
        self.robot_type = hello.robot_type.clone();
        self.joints = hello.joints.clone();
        self.connection_id = Some(connection_id);
        self.phase = SessionPhase::Streaming;
        self.last_seen_at = Instant::now();
    }

    /// Detach `connection_id`; returns false if another connection owns the session
    pub fn detach(&mut self, connection_id: u64) -> bool {
        if self.connection_id != Some(connection_id) {
            return false;
        }
        self.connection_id = None;
        self.phase = SessionPhase::Detached;
        true
    }

    /// Check a frame against session state without applying it
    pub fn check(&self, connection_id: u64, frame: &CalibratedFrame) -> Result<(), IngestError> {
        if self.connection_id != Some(connection_id) {
            return Err(IngestError::Superseded {
                session_id: self.session_id.clone(),
            });
        }

        if let Some(last_sequence) = self.last_sequence() {
            if frame.sequence <= last_sequence {
                return Err(OutOfOrderFrameError {
                    session_id: self.session_id.clone(),
                    sequence: frame.sequence,
                    last_sequence,
                }
                .into());
            }
        }

        if let Some(missing) = self.joints.iter().find(|j| !frame.angles.contains_key(&j.name)) {
            return Err(IngestError::IncompleteFrame {
                session_id: self.session_id.clone(),
                joint: missing.name.clone(),
            });
        }

        Ok(())
    }

    /// Validate and apply a frame, returning its dashboard event
    pub fn apply(
        &mut self,
        connection_id: u64,
        frame: CalibratedFrame,
    ) -> Result<FrameEvent, IngestError> {
        if let Err(e) = self.check(connection_id, &frame) {
            if !matches!(e, IngestError::Superseded { .. }) {
                self.frames_dropped += 1;
            }
            return Err(e);
        }

        let event = self.frame_event(&frame);
        self.last_frame = Some(frame);
        self.last_seen_at = Instant::now();
        self.frames_applied += 1;
        Ok(event)
    }

    /// Whether nothing has been received for longer than `idle_timeout`
    pub fn is_stale(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen_at) > idle_timeout
    }

    /// Dashboard view of a frame of this session
    pub fn frame_event(&self, frame: &CalibratedFrame) -> FrameEvent {
        let normalized: BTreeMap<String, f64> = self
            .joints
            .iter()
            .filter_map(|j| frame.angle(&j.name).map(|a| (j.name.clone(), j.normalize(a))))
            .collect();

        FrameEvent {
            session_id: self.session_id.clone(),
            device_id: self.device_id.clone(),
            robot_type: self.robot_type.clone(),
            sequence: frame.sequence,
            timestamp_ms: frame.timestamp_ms,
            angles: frame.angles.clone(),
            normalized,
        }
    }

    /// Status event for this session
    pub fn status_event(&self, status: ConnectionStatus) -> StatusEvent {
        StatusEvent {
            session_id: self.session_id.clone(),
            device_id: self.device_id.clone(),
            status,
        }
    }

    /// Point-in-time copy for reporting
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            device_id: self.device_id.clone(),
            robot_type: self.robot_type.clone(),
            phase: self.phase,
            last_frame: self.last_frame.as_ref().map(|f| self.frame_event(f)),
            connected_for: self.connected_at.elapsed(),
            idle_for: self.last_seen_at.elapsed(),
            frames_applied: self.frames_applied,
            frames_dropped: self.frames_dropped,
        }
    }
}

/// Copy of a session's state
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub device_id: String,
    pub robot_type: String,
    pub phase: SessionPhase,
    pub last_frame: Option<FrameEvent>,
    pub connected_for: Duration,
    pub idle_for: Duration,
    pub frames_applied: u64,
    pub frames_dropped: u64,
}

impl SessionSnapshot {
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_frame.as_ref().map(|f| f.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> Hello {
        Hello {
            session_id: "arm-1".into(),
            device_id: "arm".into(),
            robot_type: "so101_leader".into(),
            joints: vec![
                JointBounds {
                    name: "elbow".into(),
                    angle_min: -90.0,
                    angle_max: 90.0,
                },
                JointBounds {
                    name: "gripper".into(),
                    angle_min: 0.0,
                    angle_max: 100.0,
                },
            ],
        }
    }

    fn frame(seq: u64) -> CalibratedFrame {
        let mut angles = BTreeMap::new();
        angles.insert("elbow".to_string(), seq as f64);
        angles.insert("gripper".to_string(), 50.0);
        CalibratedFrame::new("arm-1", seq, seq * 33, angles)
    }

    #[test]
    fn test_sequence_scenario() {
        let mut session = ClientSession::new(&hello(), 1);

        for seq in [1, 2, 4] {
            assert!(session.apply(1, frame(seq)).is_ok());
        }
        let err = session.apply(1, frame(3)).unwrap_err();
        assert_eq!(
            err,
            IngestError::OutOfOrder(OutOfOrderFrameError {
                session_id: "arm-1".into(),
                sequence: 3,
                last_sequence: 4,
            })
        );
        assert_eq!(session.last_sequence(), Some(4));

        assert!(session.apply(1, frame(5)).is_ok());
        assert_eq!(session.last_frame, Some(frame(5)));
        assert_eq!(session.frames_applied, 4);
        assert_eq!(session.frames_dropped, 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut session = ClientSession::new(&hello(), 1);
        session.apply(1, frame(7)).unwrap();

        assert!(session.apply(1, frame(7)).is_err());
        assert_eq!(session.last_sequence(), Some(7));
    }

    #[test]
    fn test_incomplete_frame_rejected() {
        let mut session = ClientSession::new(&hello(), 1);
        let mut partial = frame(1);
        partial.angles.remove("gripper");

        assert!(matches!(
            session.apply(1, partial),
            Err(IngestError::IncompleteFrame { ref joint, .. }) if joint == "gripper"
        ));
        assert!(session.last_frame.is_none());
    }

    #[test]
    fn test_superseded_connection() {
        let mut session = ClientSession::new(&hello(), 1);
        session.attach(&hello(), 2);

        assert!(matches!(
            session.apply(1, frame(1)),
            Err(IngestError::Superseded { .. })
        ));
        assert!(session.apply(2, frame(1)).is_ok());
        assert_eq!(session.frames_dropped, 0);
    }

    #[test]
    fn test_detach_only_owner() {
        let mut session = ClientSession::new(&hello(), 1);
        session.attach(&hello(), 2);

        assert!(!session.detach(1));
        assert_eq!(session.phase, SessionPhase::Streaming);
        assert!(session.detach(2));
        assert_eq!(session.phase, SessionPhase::Detached);
        assert_eq!(session.connection_id, None);
    }

    #[test]
    fn test_frame_event_normalizes() {
        let session = ClientSession::new(&hello(), 1);
        let event = session.frame_event(&frame(45));

        assert_eq!(event.normalized["elbow"], 0.75);
        assert_eq!(event.normalized["gripper"], 0.5);
        assert_eq!(event.device_id, "arm");
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_stale() {
        let session = ClientSession::new(&hello(), 1);
        let idle = Duration::from_secs(10);

        assert!(!session.is_stale(Instant::now(), idle));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(session.is_stale(Instant::now(), idle));
    }
}
