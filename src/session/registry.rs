//! Session registry
//!
//! Owns every live [`ClientSession`], keyed by session identity. A session
//! outlives its connections: a stream that closes leaves the session
//! detached, and a new stream with the same identity resumes it until the
//! idle timeout removes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::frame::CalibratedFrame;
use crate::protocol::Hello;
use crate::relay::{ConnectionStatus, FrameEvent, StatusEvent};

use super::error::IngestError;
use super::state::{ClientSession, SessionSnapshot};

/// How a hello was bound to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOpen {
    /// No live session existed; a new one was created
    Fresh,
    /// A detached session was resumed
    Resumed { last_sequence: Option<u64> },
    /// A session attached to another connection was taken over
    TakenOver {
        previous_connection: u64,
        last_sequence: Option<u64>,
    },
}

/// Registry of live client sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<ClientSession>>>>,
    idle_timeout: Duration,
    frames_applied: AtomicU64,
    frames_dropped: AtomicU64,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            frames_applied: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Bind `connection_id` to the session named by `hello`
    ///
    /// A session that has already gone stale but was not yet cleaned up is
    /// replaced, so its sequence history does not leak into the new stream.
    pub async fn open(&self, hello: &Hello, connection_id: u64) -> SessionOpen {
        let mut sessions = self.sessions.write().await;

        if let Some(session_arc) = sessions.get(&hello.session_id) {
            let mut session = session_arc.lock().await;

            if !session.is_stale(Instant::now(), self.idle_timeout) {
                let last_sequence = session.last_sequence();
                let previous = session.connection_id;
                session.attach(hello, connection_id);

                return match previous {
                    Some(previous_connection) => {
                        tracing::info!(
                            session_id = %hello.session_id,
                            connection_id = connection_id,
                            previous_connection = previous_connection,
                            "Session taken over by new stream"
                        );
                        SessionOpen::TakenOver {
                            previous_connection,
                            last_sequence,
                        }
                    }
                    None => {
                        tracing::info!(
                            session_id = %hello.session_id,
                            connection_id = connection_id,
                            last_sequence = ?last_sequence,
                            "Session resumed"
                        );
                        SessionOpen::Resumed { last_sequence }
                    }
                };
            }

            tracing::debug!(
                session_id = %hello.session_id,
                "Replacing stale session"
            );
        }

        sessions.insert(
            hello.session_id.clone(),
            Arc::new(Mutex::new(ClientSession::new(hello, connection_id))),
        );

        tracing::info!(
            session_id = %hello.session_id,
            device_id = %hello.device_id,
            connection_id = connection_id,
            joints = hello.joints.len(),
            "Session opened"
        );

        SessionOpen::Fresh
    }

    /// Apply a frame received on `connection_id` for `session_id`
    pub async fn ingest(
        &self,
        session_id: &str,
        connection_id: u64,
        frame: CalibratedFrame,
    ) -> Result<FrameEvent, IngestError> {
        if frame.session_id != session_id {
            return Err(IngestError::SessionMismatch {
                expected: session_id.to_string(),
                actual: frame.session_id,
            });
        }

        let session_arc = self
            .lookup(session_id)
            .await
            .ok_or_else(|| IngestError::UnknownSession(session_id.to_string()))?;

        self.apply(&session_arc, connection_id, frame).await
    }

    /// Apply a frame on the stream opened by `hello`, reopening its session
    /// first if it expired while the stream was still attached
    ///
    /// The frame that found the session gone becomes the first frame of the
    /// fresh session. Returns the reopen outcome when a reopen happened.
    pub async fn ingest_or_reopen(
        &self,
        hello: &Hello,
        connection_id: u64,
        frame: CalibratedFrame,
    ) -> (Option<SessionOpen>, Result<FrameEvent, IngestError>) {
        if frame.session_id != hello.session_id {
            return (
                None,
                Err(IngestError::SessionMismatch {
                    expected: hello.session_id.clone(),
                    actual: frame.session_id,
                }),
            );
        }

        if let Some(session_arc) = self.lookup(&hello.session_id).await {
            return (None, self.apply(&session_arc, connection_id, frame).await);
        }

        let outcome = self.open(hello, connection_id).await;
        let result = match self.lookup(&hello.session_id).await {
            Some(session_arc) => self.apply(&session_arc, connection_id, frame).await,
            None => Err(IngestError::UnknownSession(hello.session_id.clone())),
        };
        (Some(outcome), result)
    }

    async fn lookup(&self, session_id: &str) -> Option<Arc<Mutex<ClientSession>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn apply(
        &self,
        session_arc: &Mutex<ClientSession>,
        connection_id: u64,
        frame: CalibratedFrame,
    ) -> Result<FrameEvent, IngestError> {
        let mut session = session_arc.lock().await;
        match session.apply(connection_id, frame) {
            Ok(event) => {
                self.frames_applied.fetch_add(1, Ordering::Relaxed);
                Ok(event)
            }
            Err(e) => {
                if !matches!(e, IngestError::Superseded { .. }) {
                    self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }

    /// Detach `connection_id` from its session
    ///
    /// Returns the `disconnected` status event, or `None` if the connection
    /// no longer owns the session.
    pub async fn detach(&self, session_id: &str, connection_id: u64) -> Option<StatusEvent> {
        let session_arc = self.sessions.read().await.get(session_id).cloned()?;
        let mut session = session_arc.lock().await;

        if !session.detach(connection_id) {
            return None;
        }

        tracing::info!(
            session_id = %session_id,
            connection_id = connection_id,
            last_sequence = ?session.last_sequence(),
            "Session detached"
        );

        Some(session.status_event(ConnectionStatus::Disconnected))
    }

    /// Remove sessions idle for longer than the idle timeout
    ///
    /// Returns an `expired` status event per removed session.
    pub async fn cleanup(&self) -> Vec<StatusEvent> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        let mut stale = Vec::new();
        for (id, session_arc) in sessions.iter() {
            let session = session_arc.lock().await;
            if session.is_stale(now, self.idle_timeout) {
                stale.push(id.clone());
                expired.push(session.status_event(ConnectionStatus::Expired));
            }
        }

        for id in stale {
            sessions.remove(&id);
            tracing::info!(session_id = %id, "Session expired");
        }

        expired
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session_arc = self.sessions.read().await.get(session_id).cloned()?;
        let session = session_arc.lock().await;
        Some(session.snapshot())
    }

    /// Snapshots of every live session, ordered by session id
    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for session_arc in sessions.values() {
            out.push(session_arc.lock().await.snapshot());
        }
        out.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        out
    }

    /// Latest applied frame of every live session
    pub async fn latest_frames(&self) -> Vec<FrameEvent> {
        self.snapshots()
            .await
            .into_iter()
            .filter_map(|s| s.last_frame)
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}
