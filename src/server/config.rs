//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::engine::TransportOptions;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Depth of each session's push-event queue; notifications to a slow
    /// peer are dropped once its queue is full
    pub event_queue: usize,

    /// How long the WebSocket upgrade may take before the socket is dropped
    pub handshake_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Options handed to the media engine for every transport allocation
    pub transport: TransportOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".parse().unwrap(),
            max_connections: 0, // Unlimited
            event_queue: 64,
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true, // Signaling frames are small and latency-sensitive
            transport: TransportOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the push-event queue depth per session
    pub fn event_queue(mut self, depth: usize) -> Self {
        self.event_queue = depth.max(1);
        self
    }

    /// Set the WebSocket handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Cap the inbound bitrate the engine accepts per transport
    pub fn max_incoming_bitrate(mut self, bitrate: Option<u32>) -> Self {
        self.transport.max_incoming_bitrate = bitrate;
        self
    }

    /// Set the outgoing bitrate the engine starts each transport at
    pub fn initial_outgoing_bitrate(mut self, bitrate: u32) -> Self {
        self.transport.initial_available_outgoing_bitrate = bitrate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 4000);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.event_queue, 64);
        assert!(config.tcp_nodelay);
        assert_eq!(config.transport.max_incoming_bitrate, Some(1_500_000));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 4001);
    }

    #[test]
    fn test_builder_bind() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        let config = ServerConfig::default().bind(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_builder_max_connections() {
        let config = ServerConfig::default().max_connections(100);

        assert_eq!(config.max_connections, 100);
    }

    #[test]
    fn test_builder_event_queue_floor() {
        // A zero-depth queue would drop every notification
        let config = ServerConfig::default().event_queue(0);

        assert_eq!(config.event_queue, 1);
    }

    #[test]
    fn test_builder_handshake_timeout() {
        let config = ServerConfig::default().handshake_timeout(Duration::from_secs(30));

        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_bitrates() {
        let config = ServerConfig::default()
            .max_incoming_bitrate(None)
            .initial_outgoing_bitrate(600_000);

        assert_eq!(config.transport.max_incoming_bitrate, None);
        assert_eq!(config.transport.initial_available_outgoing_bitrate, 600_000);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .event_queue(16)
            .handshake_timeout(Duration::from_secs(5));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.event_queue, 16);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }
}
