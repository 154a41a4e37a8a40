//! Per-connection ingest handling
//!
//! One task per client stream: read the hello, bind the session, then apply
//! frames until the stream closes, goes idle or is taken over.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::TransportError;
use crate::frame::CalibratedFrame;
use crate::protocol::{Ack, Hello, Message, MessageReader, MessageWriter};
use crate::relay::{ConnectionStatus, DashboardRelay, StatusEvent};
use crate::session::{IngestError, SessionOpen, SessionRegistry};

use super::config::ServerConfig;

/// Whether the stream should keep going after a frame
enum Flow {
    Continue,
    Close,
}

/// A client telemetry stream
pub struct IngestConnection {
    connection_id: u64,
    peer: SocketAddr,
    reader: MessageReader<OwnedReadHalf>,
    writer: MessageWriter<OwnedWriteHalf>,
    config: ServerConfig,
    sessions: Arc<SessionRegistry>,
    relay: DashboardRelay,
}

impl IngestConnection {
    pub fn new(
        connection_id: u64,
        socket: TcpStream,
        peer: SocketAddr,
        config: ServerConfig,
        sessions: Arc<SessionRegistry>,
        relay: DashboardRelay,
    ) -> Self {
        let (read, write) = socket.into_split();
        Self {
            connection_id,
            peer,
            reader: MessageReader::with_max_size(read, config.max_message_size),
            writer: MessageWriter::new(write),
            config,
            sessions,
            relay,
        }
    }

    /// Serve the stream to completion
    pub async fn run(mut self) -> Result<(), TransportError> {
        let hello = self.handshake().await?;
        self.open(&hello).await;

        let result = self.stream(&hello).await;

        if let Some(status) = self
            .sessions
            .detach(&hello.session_id, self.connection_id)
            .await
        {
            self.relay.publish_status(status);
        }

        result
    }

    async fn handshake(&mut self) -> Result<Hello, TransportError> {
        let deadline = self.config.handshake_timeout;
        let msg = timeout(deadline, self.reader.read_message())
            .await
            .map_err(|_| TransportError::Timeout(deadline))??;

        match msg {
            Some(Message::Hello(hello)) => {
                hello.validate().map_err(TransportError::Handshake)?;
                Ok(hello)
            }
            Some(other) => Err(TransportError::Handshake(format!(
                "expected hello, got {:?}",
                other
            ))),
            None => Err(TransportError::Closed),
        }
    }

    async fn open(&self, hello: &Hello) {
        let outcome = self.sessions.open(hello, self.connection_id).await;
        self.announce(hello, outcome);
    }

    fn announce(&self, hello: &Hello, outcome: SessionOpen) {
        tracing::info!(
            connection_id = self.connection_id,
            peer = %self.peer,
            session_id = %hello.session_id,
            outcome = ?outcome,
            "Stream attached"
        );

        // A takeover keeps the session connected throughout
        if !matches!(outcome, SessionOpen::TakenOver { .. }) {
            self.relay.publish_status(StatusEvent {
                session_id: hello.session_id.clone(),
                device_id: hello.device_id.clone(),
                status: ConnectionStatus::Connected,
            });
        }
    }

    async fn stream(&mut self, hello: &Hello) -> Result<(), TransportError> {
        let idle = self.config.idle_timeout;

        loop {
            let msg = match timeout(idle, self.reader.read_message()).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::info!(
                        connection_id = self.connection_id,
                        session_id = %hello.session_id,
                        "Stream idle, closing"
                    );
                    return Err(TransportError::Timeout(idle));
                }
            };

            match msg {
                Some(Message::Frame(frame)) => {
                    if let Flow::Close = self.handle_frame(hello, frame).await? {
                        return Ok(());
                    }
                }
                Some(Message::Hello(_)) => {
                    return Err(TransportError::Handshake("duplicate hello".into()));
                }
                Some(Message::Ack(_)) => {
                    tracing::debug!(connection_id = self.connection_id, "Ignoring ack from client");
                }
                None => {
                    tracing::debug!(
                        connection_id = self.connection_id,
                        session_id = %hello.session_id,
                        "Client closed stream"
                    );
                    return Ok(());
                }
            }
        }
    }

    async fn handle_frame(
        &mut self,
        hello: &Hello,
        frame: CalibratedFrame,
    ) -> Result<Flow, TransportError> {
        let sequence = frame.sequence;
        let joint_count = frame.joint_count();

        let (reopened, result) = self
            .sessions
            .ingest_or_reopen(hello, self.connection_id, frame)
            .await;

        // Expired while the stream was still attached: this frame starts over
        if let Some(outcome) = reopened {
            self.announce(hello, outcome);
        }

        match result {
            Ok(event) => {
                self.relay.publish_frame(event);
                self.writer
                    .write_message(&Message::Ack(Ack::applied(sequence, joint_count)))
                    .await?;
                Ok(Flow::Continue)
            }
            Err(IngestError::OutOfOrder(e)) => {
                tracing::debug!(
                    session_id = %e.session_id,
                    sequence = e.sequence,
                    last_sequence = e.last_sequence,
                    "Dropped out-of-order frame"
                );
                Ok(Flow::Continue)
            }
            Err(IngestError::Superseded { session_id }) => {
                tracing::info!(
                    connection_id = self.connection_id,
                    session_id = %session_id,
                    "Stream superseded by newer connection"
                );
                Ok(Flow::Close)
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = self.connection_id,
                    sequence = sequence,
                    error = %e,
                    "Dropped frame"
                );
                Ok(Flow::Continue)
            }
        }
    }
}
