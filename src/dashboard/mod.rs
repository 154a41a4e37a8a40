//! Dashboard HTTP surface
//!
//! Just enough HTTP/1.1 for a browser dashboard:
//!
//! - `GET /stream` - Server-Sent Events, one event per relay publish
//! - `GET /data` - JSON snapshot of every live session
//!
//! Every other path answers `404`. Each request gets its own task; an
//! event stream holds one relay subscription for as long as the socket
//! stays open.

pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{timeout, MissedTickBehavior};

use crate::relay::{DashboardRelay, FrameEvent};
use crate::session::{SessionPhase, SessionRegistry};

/// Largest accepted request head
const MAX_REQUEST_SIZE: usize = 8 * 1024;

/// A request head must arrive within this time
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// An event stream write must complete within this time
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Path without query string
    pub path: String,
}

impl Request {
    /// Parse the request line of an HTTP/1.x request head
    pub fn parse(head: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(head).ok()?;
        let line = text.lines().next()?;
        let mut parts = line.split_whitespace();

        let method = parts.next()?.to_string();
        let target = parts.next()?;
        let version = parts.next()?;
        if !version.starts_with("HTTP/1.") {
            return None;
        }

        let path = target.split('?').next().unwrap_or(target).to_string();
        Some(Self { method, path })
    }
}

/// Route table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Stream,
    Data,
    NotFound,
    MethodNotAllowed,
}

impl Route {
    pub fn of(request: &Request) -> Self {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/stream") => Route::Stream,
            ("GET", "/data") => Route::Data,
            (_, "/stream") | (_, "/data") => Route::MethodNotAllowed,
            _ => Route::NotFound,
        }
    }
}

/// Session as shown by `/data`
#[derive(Debug, Serialize)]
struct SessionView {
    session_id: String,
    device_id: String,
    robot_type: String,
    status: SessionPhase,
    frames_applied: u64,
    frames_dropped: u64,
    idle_ms: u64,
    last_frame: Option<FrameEvent>,
}

#[derive(Debug, Serialize)]
struct DataSnapshot {
    sessions: Vec<SessionView>,
    subscribers: usize,
}

/// Accept dashboard connections until the task is aborted
///
/// Connection tasks live in a `JoinSet`, so aborting this task closes
/// every open event stream as well.
pub async fn serve(
    listener: TcpListener,
    sessions: Arc<SessionRegistry>,
    relay: DashboardRelay,
    keepalive: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let sessions = Arc::clone(&sessions);
                    let relay = relay.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle(socket, peer, sessions, relay, keepalive).await {
                            tracing::debug!(peer = %peer, error = %e, "Dashboard connection ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept dashboard connection");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn handle(
    mut socket: TcpStream,
    peer: SocketAddr,
    sessions: Arc<SessionRegistry>,
    relay: DashboardRelay,
    keepalive: Duration,
) -> std::io::Result<()> {
    let request = match timeout(REQUEST_TIMEOUT, read_request(&mut socket)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => return write_response(&mut socket, 400, "text/plain", "bad request").await,
        Ok(Err(e)) => return Err(e),
        Err(_) => return Ok(()),
    };

    tracing::debug!(peer = %peer, method = %request.method, path = %request.path, "Dashboard request");

    match Route::of(&request) {
        Route::Stream => stream_events(&mut socket, peer, &relay, keepalive).await,
        Route::Data => {
            let body = data_snapshot(&sessions, &relay).await?;
            write_response(&mut socket, 200, "application/json", &body).await
        }
        Route::MethodNotAllowed => {
            write_response(&mut socket, 405, "text/plain", "method not allowed").await
        }
        Route::NotFound => write_response(&mut socket, 404, "text/plain", "not found").await,
    }
}

/// Read a request head; `None` if it is malformed or too large
async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Request>> {
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if let Some(end) = find_head_end(&buf) {
            return Ok(Request::parse(&buf[..end]));
        }
        if buf.len() >= MAX_REQUEST_SIZE {
            return Ok(None);
        }
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn stream_events<S: AsyncWrite + Unpin>(
    socket: &mut S,
    peer: SocketAddr,
    relay: &DashboardRelay,
    keepalive: Duration,
) -> std::io::Result<()> {
    let mut subscription = match relay.subscribe() {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Event stream refused");
            return write_response(socket, 503, "text/plain", "too many subscribers").await;
        }
    };

    send(socket, sse::STREAM_HEADERS).await?;

    let mut ticker = tokio::time::interval(keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            delivery = subscription.recv() => {
                let Some(delivery) = delivery else {
                    break;
                };
                let text = sse::format_event(&delivery)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                send(socket, &text).await?;
            }
            _ = ticker.tick() => {
                send(socket, sse::KEEPALIVE).await?;
            }
        }
    }

    tracing::debug!(
        peer = %peer,
        subscriber = %subscription.id(),
        delivered = subscription.delivered(),
        dropped = subscription.dropped(),
        "Event stream closed"
    );
    Ok(())
}

/// Write and flush one chunk of an event stream
///
/// A subscriber that stops reading fails here once its socket buffer is
/// full, which releases its relay subscription.
async fn send<W: AsyncWrite + Unpin>(socket: &mut W, text: &str) -> std::io::Result<()> {
    let write = async {
        socket.write_all(text.as_bytes()).await?;
        socket.flush().await
    };
    timeout(WRITE_TIMEOUT, write).await.map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::TimedOut, "event stream write timed out")
    })?
}

async fn data_snapshot(
    sessions: &SessionRegistry,
    relay: &DashboardRelay,
) -> std::io::Result<String> {
    let snapshot = DataSnapshot {
        sessions: sessions
            .snapshots()
            .await
            .into_iter()
            .map(|s| SessionView {
                session_id: s.session_id,
                device_id: s.device_id,
                robot_type: s.robot_type,
                status: s.phase,
                frames_applied: s.frames_applied,
                frames_dropped: s.frames_dropped,
                idle_ms: s.idle_for.as_millis() as u64,
                last_frame: s.last_frame,
            })
            .collect(),
        subscribers: relay.subscriber_count(),
    };

    serde_json::to_string(&snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Service Unavailable",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );

    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await
}
