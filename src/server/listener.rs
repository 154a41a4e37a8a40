//! Telemetry server listener
//!
//! Handles the TCP accept loop, spawns one task per client stream and runs
//! the session sweep and the dashboard listener alongside.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::dashboard;
use crate::error::Result;
use crate::relay::DashboardRelay;
use crate::session::SessionRegistry;
use crate::stats::ServerStats;

use super::config::ServerConfig;
use super::connection::IngestConnection;

/// Telemetry server
pub struct TelemetryServer {
    config: ServerConfig,
    sessions: Arc<SessionRegistry>,
    relay: DashboardRelay,
    next_connection_id: AtomicU64,
    total_connections: AtomicU64,
    active_connections: Arc<AtomicU64>,
    connection_semaphore: Option<Arc<Semaphore>>,
    started_at: Instant,
}

impl TelemetryServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            sessions: Arc::new(SessionRegistry::new(config.idle_timeout)),
            relay: DashboardRelay::with_config(config.relay.clone()),
            config,
            next_connection_id: AtomicU64::new(1),
            total_connections: AtomicU64::new(0),
            active_connections: Arc::new(AtomicU64::new(0)),
            connection_semaphore,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the session registry
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Get the dashboard relay
    pub fn relay(&self) -> &DashboardRelay {
        &self.relay
    }

    /// Current server-wide statistics
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_sessions: self.sessions.session_count().await as u64,
            active_subscribers: self.relay.subscriber_count() as u64,
            frames_applied: self.sessions.frames_applied(),
            frames_dropped: self.sessions.frames_dropped(),
            events_published: self.relay.published(),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Run the server
    ///
    /// This method blocks until an unrecoverable error.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured addresses and run until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let ingest = TcpListener::bind(self.config.bind_addr).await?;
        let dashboard = match self.config.dashboard_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        self.serve_until(ingest, dashboard, shutdown).await
    }

    /// Serve on already-bound listeners until `shutdown` completes
    ///
    /// Open streams and dashboard connections are dropped on shutdown.
    pub async fn serve_until<F>(
        &self,
        ingest: TcpListener,
        dashboard: Option<TcpListener>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %ingest.local_addr()?, "Telemetry server listening");

        let dashboard_handle = match dashboard {
            Some(listener) => {
                tracing::info!(addr = %listener.local_addr()?, "Dashboard listening");
                Some(tokio::spawn(dashboard::serve(
                    listener,
                    Arc::clone(&self.sessions),
                    self.relay.clone(),
                    self.config.keepalive_interval,
                )))
            }
            None => None,
        };

        let cleanup_handle = self.spawn_cleanup_task();
        let mut connections = JoinSet::new();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&ingest, &mut connections) => result,
        };

        cleanup_handle.abort();
        if let Some(handle) = dashboard_handle {
            handle.abort();
        }
        connections.abort_all();

        result
    }

    async fn accept_loop(
        &self,
        listener: &TcpListener,
        connections: &mut JoinSet<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(socket, peer_addr, connections);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        connections: &mut JoinSet<()>,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let connection = IngestConnection::new(
            connection_id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.sessions),
            self.relay.clone(),
        );
        let active = ActiveGuard::new(Arc::clone(&self.active_connections));

        connections.spawn(async move {
            let _permit = permit;
            let _active = active;

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    connection_id = connection_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(connection_id = connection_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Periodically expire idle sessions and tell dashboards about it
    fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let relay = self.relay.clone();
        let period = self.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                for status in sessions.cleanup().await {
                    relay.publish_status(status);
                }
            }
        })
    }

    /// Get the configured ingest address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

/// Counts a connection as active for as long as it lives
struct ActiveGuard(Arc<AtomicU64>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
