//! WebSocket signaling server.
//!
//! [`SignalServer`] owns the accept loop and the shared coordinator state;
//! each accepted socket gets a [`Connection`] task of its own.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::SignalServer;
