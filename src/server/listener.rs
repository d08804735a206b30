//! Signaling server listener
//!
//! Handles the TCP accept loop and spawns one connection driver per peer.
//! Worker death reported by the media engine shuts the whole server down;
//! everything else is local to a single connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::engine::MediaEngine;
use crate::error::{Error, Result};
use crate::notify::NotificationBus;
use crate::registry::Roster;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::signaling::Dispatcher;

/// Session coordinator server
pub struct SignalServer<E: MediaEngine> {
    config: ServerConfig,
    engine: Arc<E>,
    roster: Arc<Roster>,
    bus: NotificationBus,
    dispatcher: Dispatcher<E>,
    next_conn_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<E: MediaEngine> SignalServer<E> {
    /// Create a new server with the given configuration and media engine
    pub fn new(config: ServerConfig, engine: E) -> Self {
        Self::with_engine(config, Arc::new(engine))
    }

    /// Create a new server sharing an already-wrapped engine
    pub fn with_engine(config: ServerConfig, engine: Arc<E>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let roster = Arc::new(Roster::new());
        let bus = NotificationBus::new(Arc::clone(&roster));
        let dispatcher = Dispatcher::new(
            Arc::clone(&engine),
            Arc::clone(&roster),
            bus.clone(),
            config.transport.clone(),
        );

        Self {
            config,
            engine,
            roster,
            bus,
            dispatcher,
            next_conn_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the session roster
    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    /// Get a reference to the media engine
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails or the media engine
    /// worker dies.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "signaling server listening");

        tokio::select! {
            result = self.accept_loop(&listener) => result,
            _ = self.engine.worker_died() => {
                tracing::error!("media engine worker died, shutting down");
                Err(Error::WorkerDied)
            }
        }
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "signaling server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
            _ = self.engine.worker_died() => {
                tracing::error!("media engine worker died, shutting down");
                Err(Error::WorkerDied)
            }
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            conn = conn_id,
            peer = %peer_addr,
            "new connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "failed to configure socket");
            return;
        }

        let connection = Connection::new(
            conn_id,
            socket,
            peer_addr,
            self.config.clone(),
            self.dispatcher.clone(),
            Arc::clone(&self.roster),
            self.bus.clone(),
        );

        tokio::spawn(async move {
            // Hold the permit for as long as the connection lives
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    conn = conn_id,
                    error = %e,
                    "connection error"
                );
            }

            tracing::debug!(conn = conn_id, "connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
