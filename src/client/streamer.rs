//! Fixed-rate telemetry streamer
//!
//! Drives a [`SampleSource`] on a fixed period, calibrates each raw frame
//! and pushes it to the server. Nothing is ever queued: a tick that cannot
//! be sent right now is dropped, because a newer frame will supersede it
//! one period later.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::calibration::CalibrationStore;
use crate::error::{Error, Result};
use crate::frame::{unix_millis, CalibratedFrame};
use crate::protocol::Hello;
use crate::source::{HardwareReadError, SampleSource};
use crate::transform::{transform_frame, FrameError};

use super::backoff::{Backoff, FailureTracker};
use super::config::ClientConfig;
use super::connection::TelemetryConnection;
use super::state::{ClientEvent, ClientReport, ClientState, SkipReason};

/// Capacity of the client event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Streaming telemetry client
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
///
/// use armstream::calibration::{CalibrationFile, CalibrationStore};
/// use armstream::client::{ClientConfig, StreamingClient};
/// use armstream::source::DebugSimulator;
///
/// # async fn example() -> armstream::Result<()> {
/// let store = Arc::new(CalibrationStore::load(&CalibrationFile::new("arm.json"))?);
/// let source = DebugSimulator::new(&store, ["shoulder_pan", "elbow_flex"])?;
///
/// let config = ClientConfig::new("localhost:50051").device("arm_1", "so101_leader");
/// let (client, mut events) = StreamingClient::new(config, store, source);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// let report = client.run_until(async {
///     let _ = tokio::signal::ctrl_c().await;
/// }).await?;
/// println!("sent {} frames", report.frames_sent);
/// # Ok(())
/// # }
/// ```
pub struct StreamingClient<S> {
    config: ClientConfig,
    store: Arc<CalibrationStore>,
    source: S,
    hello: Hello,
    state: ClientState,
    event_tx: mpsc::Sender<ClientEvent>,
    next_sequence: u64,
    backoff: Backoff,
    failures: FailureTracker,
    report: ClientReport,
}

impl<S: SampleSource> StreamingClient<S> {
    /// Create a new client
    ///
    /// Returns the client and a receiver for its events. Events are
    /// dropped rather than awaited if the receiver falls behind.
    pub fn new(
        config: ClientConfig,
        store: Arc<CalibrationStore>,
        source: S,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let session_id = config.resolve_session_id();
        let hello = Hello::new(session_id, &config.device_id, &config.robot_type, &store);
        let backoff = Backoff::new(config.initial_backoff, config.max_backoff);
        let failures = FailureTracker::new(config.max_consecutive_failures);

        let client = Self {
            config,
            store,
            source,
            hello,
            state: ClientState::Disconnected,
            event_tx,
            next_sequence: 1,
            backoff,
            failures,
            report: ClientReport::default(),
        };

        (client, event_rx)
    }

    pub fn session_id(&self) -> &str {
        &self.hello.session_id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Stream until a fatal error
    pub async fn run(self) -> Result<ClientReport> {
        self.run_until(std::future::pending()).await
    }

    /// Stream until `shutdown` completes or a fatal error occurs
    ///
    /// Fatal errors are a joint unknown to the calibration and hardware
    /// faults persisting past `max_consecutive_failures`. Transport
    /// failures are retried forever.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<ClientReport>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            session_id = %self.hello.session_id,
            server = %self.config.server_addr,
            source = self.source.kind(),
            rate_hz = self.config.sample_rate_hz,
            joints = self.store.len(),
            "Streaming client starting"
        );

        let mut ticker = tokio::time::interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut link = Link::default();

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!(session_id = %self.hello.session_id, "Shutdown requested");
                    break Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick(&mut link).await {
                break Err(e);
            }
        };

        if let Some(connection) = link.connection.take() {
            connection.close().await;
        }
        self.set_state(ClientState::Stopped);

        tracing::info!(
            session_id = %self.hello.session_id,
            frames_sent = self.report.frames_sent,
            ticks_skipped = self.report.ticks_skipped,
            hardware_faults = self.report.hardware_faults,
            connections = self.report.connections,
            "Streaming client stopped"
        );

        result.map(|()| self.report)
    }

    async fn tick(&mut self, link: &mut Link) -> Result<()> {
        if link.connection.as_ref().is_some_and(|c| c.is_broken()) {
            link.connection = None;
            tracing::warn!(session_id = %self.hello.session_id, "Stream closed by server");
            self.schedule_reconnect(link);
        }

        if link.connection.is_none() && link.retry_due() {
            self.connect(link).await;
        }

        let Some(connection) = link.connection.as_mut() else {
            self.skip(SkipReason::NotConnected);
            return Ok(());
        };

        let raw = match self.source.next_raw().await {
            Ok(raw) => raw,
            Err(e) => return self.hardware_fault(e),
        };

        let angles = match transform_frame(&raw, &self.store) {
            Ok(angles) => angles,
            Err(FrameError::UnknownJoint(e)) => {
                tracing::error!(error = %e, "Sample source reported an uncalibrated joint");
                return Err(e.into());
            }
            Err(FrameError::MissingJoint(joint)) => {
                return self.hardware_fault(HardwareReadError::missing_reading(joint));
            }
            Err(FrameError::NonFinite(joint)) => {
                let error = HardwareReadError::device("non-finite reading").for_joint(joint);
                return self.hardware_fault(error);
            }
        };
        self.failures.reset();

        // Consumed even if the send fails; sequence numbers are never reused
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.report.last_sequence = sequence;

        let frame = CalibratedFrame::new(
            self.hello.session_id.clone(),
            sequence,
            unix_millis(),
            angles,
        );

        match connection.send(frame).await {
            Ok(()) => {
                self.report.frames_sent += 1;
                self.emit(ClientEvent::FrameSent { sequence });

                let interval = self.config.progress_interval;
                if interval > 0 && self.report.frames_sent % interval == 0 {
                    tracing::info!(
                        session_id = %self.hello.session_id,
                        sequence = sequence,
                        frames_sent = self.report.frames_sent,
                        last_acked = connection.last_acked(),
                        "Streaming"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.hello.session_id,
                    sequence = sequence,
                    error = %e,
                    "Transport failure"
                );
                link.connection = None;
                self.schedule_reconnect(link);
            }
        }

        Ok(())
    }

    async fn connect(&mut self, link: &mut Link) {
        self.set_state(ClientState::Connecting);

        match TelemetryConnection::open(&self.config, &self.hello).await {
            Ok(connection) => {
                tracing::info!(
                    session_id = %self.hello.session_id,
                    peer = %connection.peer(),
                    next_sequence = self.next_sequence,
                    "Connected"
                );
                self.backoff.reset();
                self.report.connections += 1;
                link.connection = Some(connection);
                link.retry_at = None;
                self.set_state(ClientState::Streaming);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.hello.session_id,
                    server = %self.config.server_addr,
                    error = %e,
                    "Connect failed"
                );
                self.schedule_reconnect(link);
            }
        }
    }

    fn schedule_reconnect(&mut self, link: &mut Link) {
        self.set_state(ClientState::Reconnecting);

        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        link.retry_at = Some(Instant::now() + delay);

        tracing::debug!(delay_ms = delay.as_millis() as u64, attempt = attempt, "Reconnect scheduled");
        self.emit(ClientEvent::ReconnectScheduled { delay, attempt });
    }

    fn hardware_fault(&mut self, error: HardwareReadError) -> Result<()> {
        self.report.hardware_faults += 1;
        let escalate = self.failures.record(&error);
        let consecutive = self.failures.count();

        self.emit(ClientEvent::HardwareFault {
            error: error.clone(),
            consecutive,
        });

        if escalate {
            tracing::error!(
                error = %error,
                consecutive = consecutive,
                "Hardware fault persisted, stopping"
            );
            return Err(Error::Hardware(error));
        }

        tracing::warn!(
            source = self.source.kind(),
            error = %error,
            consecutive = consecutive,
            "Hardware read failed, skipping tick"
        );
        self.skip(SkipReason::HardwareFault);
        Ok(())
    }

    fn skip(&mut self, reason: SkipReason) {
        self.report.ticks_skipped += 1;
        tracing::trace!(reason = ?reason, "Tick skipped");
        self.emit(ClientEvent::TickSkipped(reason));
    }

    fn set_state(&mut self, next: ClientState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "Client state");
        self.state = next;
        self.emit(ClientEvent::StateChanged(next));
    }

    fn emit(&self, event: ClientEvent) {
        // Never stall sampling on a slow event consumer
        let _ = self.event_tx.try_send(event);
    }
}

/// Transport side of the streaming loop
#[derive(Default)]
struct Link {
    connection: Option<TelemetryConnection>,
    /// Earliest reconnect attempt; `None` means connect immediately
    retry_at: Option<Instant>,
}

impl Link {
    fn retry_due(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }
}
