//! One physical connection to the telemetry server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::TransportError;
use crate::frame::CalibratedFrame;
use crate::protocol::{Hello, Message, MessageReader, MessageWriter};

use super::config::ClientConfig;

/// An open telemetry stream
///
/// Acks are drained by a background task; when the server closes the
/// stream that task marks the connection broken so the next send fails
/// fast instead of writing into a dead socket.
pub struct TelemetryConnection {
    writer: MessageWriter<OwnedWriteHalf>,
    peer: SocketAddr,
    broken: Arc<AtomicBool>,
    last_acked: Arc<AtomicU64>,
    ack_task: JoinHandle<()>,
    write_timeout: Duration,
}

impl TelemetryConnection {
    /// Connect and send the hello
    pub async fn open(config: &ClientConfig, hello: &Hello) -> Result<Self, TransportError> {
        let connect = async {
            let stream = TcpStream::connect(config.server_addr.as_str()).await?;
            if config.tcp_nodelay {
                stream.set_nodelay(true)?;
            }
            let peer = stream.peer_addr()?;
            let (read, write) = stream.into_split();

            let mut writer = MessageWriter::new(write);
            writer.write_message(&Message::Hello(hello.clone())).await?;
            Ok::<_, TransportError>((peer, read, writer))
        };

        let (peer, read, writer) = timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout(config.connect_timeout))??;

        let broken = Arc::new(AtomicBool::new(false));
        let last_acked = Arc::new(AtomicU64::new(0));
        let ack_task = tokio::spawn(drain_acks(
            read,
            Arc::clone(&broken),
            Arc::clone(&last_acked),
        ));

        tracing::debug!(peer = %peer, session_id = %hello.session_id, "Stream opened");

        Ok(Self {
            writer,
            peer,
            broken,
            last_acked,
            ack_task,
            write_timeout: config.write_timeout,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the server side has gone away
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Highest acknowledged sequence number, 0 if none
    pub fn last_acked(&self) -> u64 {
        self.last_acked.load(Ordering::Relaxed)
    }

    /// Write one frame
    pub async fn send(&mut self, frame: CalibratedFrame) -> Result<(), TransportError> {
        if self.is_broken() {
            return Err(TransportError::Closed);
        }

        let write_timeout = self.write_timeout;
        let result = timeout(write_timeout, self.writer.write_message(&Message::Frame(frame)))
            .await
            .map_err(|_| TransportError::Timeout(write_timeout))
            .and_then(|r| r);

        if result.is_err() {
            self.broken.store(true, Ordering::Release);
        }
        result
    }

    /// Close the write side and stop draining acks
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!(peer = %self.peer, error = %e, "Shutdown after close");
        }
    }
}

impl Drop for TelemetryConnection {
    fn drop(&mut self) {
        self.ack_task.abort();
    }
}

async fn drain_acks(read: OwnedReadHalf, broken: Arc<AtomicBool>, last_acked: Arc<AtomicU64>) {
    let mut reader = MessageReader::new(read);

    loop {
        match reader.read_message().await {
            Ok(Some(Message::Ack(ack))) => {
                if ack.success {
                    last_acked.fetch_max(ack.sequence, Ordering::Relaxed);
                    tracing::trace!(sequence = ack.sequence, message = %ack.message, "Ack");
                } else {
                    tracing::warn!(sequence = ack.sequence, message = %ack.message, "Frame refused");
                }
            }
            Ok(Some(other)) => {
                tracing::warn!(message = ?other, "Unexpected message from server");
            }
            Ok(None) => {
                tracing::debug!("Server closed stream");
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ack stream failed");
                break;
            }
        }
    }

    broken.store(true, Ordering::Release);
}
